use crate::config::SelectionConfig;
use crate::types::{AssetRecord, EventTime, RegionGeometry};
use geo::Intersects;

/// Why a record failed acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Sensor is not in the configured set
    SensorNotConfigured,
    /// Acquisition outside the event window
    OutsideWindow,
    /// Optical asset without a cloud-cover value; quality cannot be assessed
    CloudCoverMissing,
    /// Optical asset above the cloud ceiling
    CloudAboveCeiling,
    /// Coarse query hit whose true footprint misses the region
    NoIntersection,
    /// Coarse query hit without a footprint to re-check
    FootprintMissing,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::SensorNotConfigured => "sensor-not-configured",
            RejectReason::OutsideWindow => "outside-window",
            RejectReason::CloudCoverMissing => "cloud-cover-missing",
            RejectReason::CloudAboveCeiling => "cloud-above-ceiling",
            RejectReason::NoIntersection => "no-intersection",
            RejectReason::FootprintMissing => "footprint-missing",
        };
        write!(f, "{}", s)
    }
}

/// Hard acceptance criteria for raw catalog records.
///
/// The "S1 OR low-cloud S2" policy falls out of independent per-sensor
/// rules: optical carries a cloud requirement, radar none at all. New
/// sensors add a rule, they never touch the existing ones.
pub struct AssetFilter {
    config: SelectionConfig,
}

impl AssetFilter {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Accepted records in input order. `coarse` marks records that came
    /// from a bbox query and still need the precise intersection re-check.
    /// Rejections are logged with their reason, never raised.
    pub fn filter(
        &self,
        records: Vec<AssetRecord>,
        geometry: &RegionGeometry,
        event_time: &EventTime,
        coarse: bool,
    ) -> Vec<AssetRecord> {
        let total = records.len();
        let mut accepted = Vec::with_capacity(total);
        for record in records {
            match self.rejection(&record, geometry, event_time, coarse) {
                None => accepted.push(record),
                Some(reason) => {
                    log::debug!(
                        "Excluded {} ({}, {}): {}",
                        record.id,
                        record.sensor,
                        record.acquired.to_rfc3339(),
                        reason
                    );
                }
            }
        }
        log::info!("Filter accepted {}/{} record(s)", accepted.len(), total);
        accepted
    }

    /// First acceptance rule a record violates; `None` when accepted.
    ///
    /// Rule order: sensor eligibility, temporal window (inclusive at
    /// exactly the proximity threshold), per-sensor cloud policy, then the
    /// precise intersection re-check for coarse hits.
    pub fn rejection(
        &self,
        record: &AssetRecord,
        geometry: &RegionGeometry,
        event_time: &EventTime,
        coarse: bool,
    ) -> Option<RejectReason> {
        if !self.config.sensors.contains(&record.sensor) {
            return Some(RejectReason::SensorNotConfigured);
        }

        if event_time.distance_from(record.acquired) > self.config.proximity() {
            return Some(RejectReason::OutsideWindow);
        }

        // Radar sees through cloud; only optical must prove a usable sky
        if record.sensor.is_optical() {
            match record.cloud_cover {
                None => return Some(RejectReason::CloudCoverMissing),
                Some(cloud) if cloud > self.config.cloud_ceiling_pct => {
                    return Some(RejectReason::CloudAboveCeiling);
                }
                Some(_) => {}
            }
        }

        if coarse {
            match &record.footprint {
                None => return Some(RejectReason::FootprintMissing),
                Some(footprint) if !footprint.intersects(&geometry.boundary) => {
                    return Some(RejectReason::NoIntersection);
                }
                Some(_) => {}
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, SensorType};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use geo::{polygon, MultiPolygon};
    use std::collections::BTreeMap;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn region() -> RegionGeometry {
        let boundary = MultiPolygon(vec![polygon![
            (x: -60.0, y: -35.0),
            (x: -58.0, y: -35.0),
            (x: -58.0, y: -33.0),
            (x: -60.0, y: -33.0),
        ]]);
        let bbox = BoundingBox::from_geometry(&boundary).unwrap();
        RegionGeometry { boundary, bbox }
    }

    fn record(id: &str, sensor: SensorType, acquired: DateTime<Utc>) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            sensor,
            acquired,
            cloud_cover: None,
            footprint: Some(region().boundary),
            coverage_fraction: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn window_boundary_is_inclusive_at_exactly_delta() {
        let filter = AssetFilter::new(SelectionConfig::default());
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        let at_delta = record("s1-at-delta", SensorType::S1, utc(2023, 3, 14, 0, 0, 0));
        assert_eq!(filter.rejection(&at_delta, &geometry, &event, false), None);

        let mut past_delta = at_delta.clone();
        past_delta.acquired = past_delta.acquired + Duration::seconds(1);
        assert_eq!(
            filter.rejection(&past_delta, &geometry, &event, false),
            Some(RejectReason::OutsideWindow)
        );
    }

    #[test]
    fn optical_cloud_policy_enforced() {
        let filter = AssetFilter::new(SelectionConfig::default());
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        let mut clear = record("s2-clear", SensorType::S2, utc(2023, 3, 12, 10, 0, 0));
        clear.cloud_cover = Some(10.0);
        assert_eq!(filter.rejection(&clear, &geometry, &event, false), None);

        let mut cloudy = clear.clone();
        cloudy.cloud_cover = Some(45.0);
        assert_eq!(
            filter.rejection(&cloudy, &geometry, &event, false),
            Some(RejectReason::CloudAboveCeiling)
        );

        let mut unknown = clear.clone();
        unknown.cloud_cover = None;
        assert_eq!(
            filter.rejection(&unknown, &geometry, &event, false),
            Some(RejectReason::CloudCoverMissing)
        );
    }

    #[test]
    fn ceiling_boundary_is_inclusive() {
        let filter = AssetFilter::new(SelectionConfig::default());
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        let mut at_ceiling = record("s2-at-ceiling", SensorType::S2, utc(2023, 3, 12, 10, 0, 0));
        at_ceiling.cloud_cover = Some(30.0);
        assert_eq!(filter.rejection(&at_ceiling, &geometry, &event, false), None);
    }

    #[test]
    fn radar_acceptance_is_independent_of_cloud_values() {
        let filter = AssetFilter::new(SelectionConfig::default());
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        // Same radar record with no, moderate and absurd injected cloud values
        for injected in [None, Some(45.0), Some(100.0)] {
            let mut radar = record("s1-cloudy", SensorType::S1, utc(2023, 3, 12, 10, 0, 0));
            radar.cloud_cover = injected;
            assert_eq!(
                filter.rejection(&radar, &geometry, &event, false),
                None,
                "radar acceptance must not depend on cloud_cover={:?}",
                injected
            );
        }
    }

    #[test]
    fn unconfigured_sensor_is_rejected() {
        let config = SelectionConfig {
            sensors: vec![SensorType::S1],
            ..Default::default()
        };
        let filter = AssetFilter::new(config);
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        let mut optical = record("s2-any", SensorType::S2, utc(2023, 3, 12, 10, 0, 0));
        optical.cloud_cover = Some(1.0);
        assert_eq!(
            filter.rejection(&optical, &geometry, &event, false),
            Some(RejectReason::SensorNotConfigured)
        );
    }

    #[test]
    fn coarse_hits_need_true_intersection() {
        let filter = AssetFilter::new(SelectionConfig::default());
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        // Footprint inside the region's bbox neighborhood but disjoint from it
        let mut disjoint = record("s1-disjoint", SensorType::S1, utc(2023, 3, 12, 10, 0, 0));
        disjoint.footprint = Some(MultiPolygon(vec![polygon![
            (x: -57.0, y: -35.0),
            (x: -56.0, y: -35.0),
            (x: -56.0, y: -33.0),
            (x: -57.0, y: -33.0),
        ]]));
        assert_eq!(
            filter.rejection(&disjoint, &geometry, &event, true),
            Some(RejectReason::NoIntersection)
        );
        // The same record under a precise query was already vetted server-side
        assert_eq!(filter.rejection(&disjoint, &geometry, &event, false), None);

        let mut no_footprint = disjoint.clone();
        no_footprint.footprint = None;
        assert_eq!(
            filter.rejection(&no_footprint, &geometry, &event, true),
            Some(RejectReason::FootprintMissing)
        );
    }

    #[test]
    fn filter_keeps_input_order_and_drops_rejects() {
        let filter = AssetFilter::new(SelectionConfig::default());
        let event = EventTime::Instant(utc(2023, 3, 12, 0, 0, 0));
        let geometry = region();

        let mut cloudy = record("b-s2", SensorType::S2, utc(2023, 3, 12, 10, 0, 0));
        cloudy.cloud_cover = Some(80.0);
        let records = vec![
            record("c-s1", SensorType::S1, utc(2023, 3, 12, 9, 0, 0)),
            cloudy,
            record("a-s1", SensorType::S1, utc(2023, 3, 12, 11, 0, 0)),
        ];

        let accepted = filter.filter(records, &geometry, &event, false);
        let ids: Vec<&str> = accepted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c-s1", "a-s1"]);
    }
}
