use crate::types::{FloodError, FloodResult, ScoreAxis, SensorType};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration surface of the selection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Half-width of the acquisition window around the event, in days
    pub proximity_days: f64,
    /// Cloud-cover ceiling for optical assets, percent
    pub cloud_ceiling_pct: f64,
    /// Relative weight per score axis; an explicit 0.0 drops the axis from
    /// ranking, unlisted axes stay at 1.0
    pub score_weights: BTreeMap<ScoreAxis, f64>,
    /// Sensors eligible for selection
    pub sensors: Vec<SensorType>,
    /// Page size planned against and requested from the catalog
    pub page_limit: usize,
    /// Axis score at or above this attaches a `high-<axis>` tag
    pub high_tag_cut: f64,
    /// Axis score at or below this attaches a `low-<axis>` tag
    pub low_tag_cut: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let mut score_weights = BTreeMap::new();
        for axis in ScoreAxis::ALL {
            score_weights.insert(axis, 1.0); // Equal weights until tuned per deployment
        }
        Self {
            proximity_days: 2.0,     // Acquisitions within ±2 days of the event
            cloud_ceiling_pct: 30.0, // Optical scenes above this hide too much water
            score_weights,
            sensors: vec![SensorType::S1, SensorType::S2],
            page_limit: 100, // Common STAC page size
            high_tag_cut: 0.8,
            low_tag_cut: 0.2,
        }
    }
}

impl SelectionConfig {
    /// Proximity threshold Δ as a duration
    pub fn proximity(&self) -> Duration {
        Duration::milliseconds((self.proximity_days * 86_400_000.0).round() as i64)
    }

    /// Weight of one axis; unlisted axes count as 1.0
    pub fn weight(&self, axis: ScoreAxis) -> f64 {
        self.score_weights.get(&axis).copied().unwrap_or(1.0)
    }

    /// Validate once at load time. The engine refuses to start on a bad
    /// config rather than producing silently skewed rankings.
    pub fn validate(&self) -> FloodResult<()> {
        if !self.proximity_days.is_finite() || self.proximity_days <= 0.0 {
            return Err(FloodError::InvalidConfig {
                reason: format!(
                    "proximity_days must be positive, got {}",
                    self.proximity_days
                ),
            });
        }
        if !self.cloud_ceiling_pct.is_finite()
            || !(0.0..=100.0).contains(&self.cloud_ceiling_pct)
        {
            return Err(FloodError::InvalidConfig {
                reason: format!(
                    "cloud_ceiling_pct must be within [0, 100], got {}",
                    self.cloud_ceiling_pct
                ),
            });
        }
        if self.sensors.is_empty() {
            return Err(FloodError::InvalidConfig {
                reason: "sensor set is empty".to_string(),
            });
        }
        if self.page_limit == 0 {
            return Err(FloodError::InvalidConfig {
                reason: "page_limit must be at least 1".to_string(),
            });
        }
        for (axis, weight) in &self.score_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(FloodError::InvalidConfig {
                    reason: format!("weight for axis '{}' must be >= 0, got {}", axis, weight),
                });
            }
        }
        let total: f64 = ScoreAxis::ALL.iter().map(|a| self.weight(*a)).sum();
        if total <= 0.0 {
            return Err(FloodError::InvalidConfig {
                reason: "score weights sum to zero; at least one axis must carry weight"
                    .to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.high_tag_cut)
            || !(0.0..=1.0).contains(&self.low_tag_cut)
            || self.low_tag_cut > self.high_tag_cut
        {
            return Err(FloodError::InvalidConfig {
                reason: format!(
                    "tag cuts must satisfy 0 <= low ({}) <= high ({}) <= 1",
                    self.low_tag_cut, self.high_tag_cut
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SelectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.proximity(), Duration::days(2));
    }

    #[test]
    fn fractional_proximity_days_round_to_milliseconds() {
        let config = SelectionConfig {
            proximity_days: 1.5,
            ..Default::default()
        };
        assert_eq!(config.proximity(), Duration::hours(36));
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let mut config = SelectionConfig::default();
        for axis in ScoreAxis::ALL {
            config.score_weights.insert(axis, 0.0);
        }
        assert!(matches!(
            config.validate(),
            Err(FloodError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = SelectionConfig::default();
        config.score_weights.insert(ScoreAxis::Cloud, -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn cloud_ceiling_outside_percent_range_is_rejected() {
        let config = SelectionConfig {
            cloud_ceiling_pct: 130.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_sensor_set_is_rejected() {
        let config = SelectionConfig {
            sensors: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unlisted_axis_defaults_to_unit_weight() {
        let config = SelectionConfig {
            score_weights: BTreeMap::from([(ScoreAxis::Cloud, 2.0)]),
            ..Default::default()
        };
        assert_eq!(config.weight(ScoreAxis::Cloud), 2.0);
        assert_eq!(config.weight(ScoreAxis::Proximity), 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: SelectionConfig =
            serde_json::from_str(r#"{ "proximity_days": 3.0, "score_weights": { "cloud": 2.0 } }"#)
                .unwrap();
        assert_eq!(config.proximity_days, 3.0);
        assert_eq!(config.weight(ScoreAxis::Cloud), 2.0);
        assert_eq!(config.cloud_ceiling_pct, 30.0);
    }
}
