use crate::config::SelectionConfig;
use crate::types::{
    AssetRecord, FloodEvent, FloodType, RegionGeometry, ScoreAxis, ScoredAsset, SensorType,
};
use geo::{Area, BooleanOps};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Static (sensor, flood type) relevance weights.
///
/// Radar is favored where persistent cloud hides the flood peak (riverine),
/// optical where fine visual detail is diagnostic (flash). Unrecognized
/// flood types stay neutral for every sensor.
fn relevance_weight(sensor: SensorType, flood_type: &FloodType) -> f64 {
    match (sensor, flood_type) {
        (SensorType::S1, FloodType::Riverine) => 0.9,
        (SensorType::S2, FloodType::Riverine) => 0.6,
        (SensorType::S1, FloodType::Flash) => 0.6,
        (SensorType::S2, FloodType::Flash) => 0.8,
        (SensorType::S1, FloodType::Coastal) => 0.8,
        (SensorType::S2, FloodType::Coastal) => 0.7,
        (_, FloodType::Other(_)) => 0.5,
    }
}

/// Cloud axis: optical improves as the sky clears; radar sits at the
/// neutral ceiling, neither penalized nor rewarded
fn cloud_score(record: &AssetRecord) -> f64 {
    match record.sensor {
        SensorType::S1 => 1.0,
        SensorType::S2 => record
            .cloud_cover
            .map_or(0.0, |pct| (1.0 - pct / 100.0).clamp(0.0, 1.0)),
    }
}

/// Completeness axis: footprint-to-region intersection fraction when the
/// footprint is known, else whatever fraction the catalog client computed
fn completeness_score(record: &AssetRecord, geometry: &RegionGeometry) -> f64 {
    if let Some(footprint) = &record.footprint {
        let region_area = geometry.boundary.unsigned_area();
        if region_area > 0.0 {
            let overlap = footprint.intersection(&geometry.boundary).unsigned_area();
            return (overlap / region_area).clamp(0.0, 1.0);
        }
    }
    record.coverage_fraction.map_or(0.0, |f| f.clamp(0.0, 1.0))
}

/// Scores accepted records along independent axes and ranks them.
/// Pure given its inputs; performs no I/O.
pub struct AssetScorer {
    config: SelectionConfig,
}

impl AssetScorer {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Score records in parallel and return them in final rank order:
    /// aggregate descending, ties by acquisition time ascending, then id.
    pub fn score(
        &self,
        accepted: Vec<AssetRecord>,
        geometry: &RegionGeometry,
        event: &FloodEvent,
    ) -> Vec<ScoredAsset> {
        let mut scored: Vec<ScoredAsset> = accepted
            .into_par_iter()
            .map(|record| self.score_record(record, geometry, event))
            .collect();
        sort_ranked(&mut scored);

        if let Some(best) = scored.first() {
            log::info!(
                "Scored {} candidate(s) for event {}; best {} at {:.3}",
                scored.len(),
                event.id,
                best.record.id,
                best.rank_score
            );
        }
        scored
    }

    /// One record's axis scores, weighted aggregate and tags
    pub fn score_record(
        &self,
        record: AssetRecord,
        geometry: &RegionGeometry,
        event: &FloodEvent,
    ) -> ScoredAsset {
        let mut scores = BTreeMap::new();
        scores.insert(ScoreAxis::Cloud, cloud_score(&record));
        scores.insert(
            ScoreAxis::Completeness,
            completeness_score(&record, geometry),
        );
        scores.insert(ScoreAxis::Proximity, self.proximity_score(&record, event));
        scores.insert(
            ScoreAxis::Relevance,
            relevance_weight(record.sensor, &event.flood_type),
        );

        let rank_score = self.weighted_mean(&scores);
        let tags = self.tags_for(&scores);

        log::debug!(
            "{}: cloud {:.2} completeness {:.2} proximity {:.2} relevance {:.2} -> {:.3}",
            record.id,
            scores[&ScoreAxis::Cloud],
            scores[&ScoreAxis::Completeness],
            scores[&ScoreAxis::Proximity],
            scores[&ScoreAxis::Relevance],
            rank_score
        );

        ScoredAsset {
            record,
            scores,
            rank_score,
            tags,
        }
    }

    /// Linear decay with temporal distance, 1.0 at the event itself,
    /// 0.0 at the proximity threshold
    fn proximity_score(&self, record: &AssetRecord, event: &FloodEvent) -> f64 {
        let delta_ms = self.config.proximity().num_milliseconds() as f64;
        if delta_ms <= 0.0 {
            return 0.0;
        }
        let dist_ms = event.time.distance_from(record.acquired).num_milliseconds() as f64;
        (1.0 - dist_ms / delta_ms).clamp(0.0, 1.0)
    }

    /// Weighted mean over the axes carrying positive weight
    fn weighted_mean(&self, scores: &BTreeMap<ScoreAxis, f64>) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (axis, score) in scores {
            let weight = self.config.weight(*axis);
            if weight > 0.0 {
                weighted += weight * score;
                total += weight;
            }
        }
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    fn tags_for(&self, scores: &BTreeMap<ScoreAxis, f64>) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        for (axis, score) in scores {
            if *score >= self.config.high_tag_cut {
                tags.insert(format!("high-{}", axis));
            } else if *score <= self.config.low_tag_cut {
                tags.insert(format!("low-{}", axis));
            }
        }
        tags
    }
}

/// Deterministic final ordering: rank descending, then acquisition time
/// ascending, then asset id ascending
fn sort_ranked(scored: &mut [ScoredAsset]) {
    scored.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| a.record.acquired.cmp(&b.record.acquired))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}
