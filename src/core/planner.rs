use crate::config::SelectionConfig;
use crate::types::{CatalogQuery, EventTime, RegionGeometry, SensorType, SpatialFilter, TimeWindow};
use std::collections::BTreeSet;

/// Expected scene arrivals per day, used to estimate result counts against
/// the page limit. S1 passes over Argentina yield a few overlapping frames
/// per day; the two-satellite S2 constellation produces more tiles.
fn daily_scene_density(sensor: SensorType) -> f64 {
    match sensor {
        SensorType::S1 => 4.0,
        SensorType::S2 => 6.0,
    }
}

/// Builds minimal catalog queries for one event.
///
/// One query per configured sensor, polygon spatial filter when the catalog
/// supports intersection, bbox fallback otherwise (the fallback is coarse;
/// the filter re-checks true intersection downstream). Windows are split
/// only when a single query would likely overflow the page limit.
pub struct QueryPlanner {
    config: SelectionConfig,
}

impl QueryPlanner {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// The ordered query list for one event window over a region.
    /// Deterministic: same inputs, same order.
    pub fn plan(
        &self,
        geometry: &RegionGeometry,
        event_time: &EventTime,
        sensors: &[SensorType],
        polygon_supported: bool,
    ) -> Vec<CatalogQuery> {
        let window = event_time.window(self.config.proximity());
        self.plan_windows(geometry, &[window], sensors, polygon_supported)
    }

    /// Multi-window entry point. Overlapping or abutting windows are merged
    /// per sensor before the page-limit split, so the same acquisition is
    /// never requested twice by adjacent windows.
    pub fn plan_windows(
        &self,
        geometry: &RegionGeometry,
        windows: &[TimeWindow],
        sensors: &[SensorType],
        polygon_supported: bool,
    ) -> Vec<CatalogQuery> {
        let spatial = if polygon_supported {
            SpatialFilter::Intersects(geometry.boundary.clone())
        } else {
            log::warn!("Catalog lacks polygon filters; planning coarse bbox queries");
            SpatialFilter::Bbox(geometry.bbox)
        };

        let merged = merge_windows(windows);
        let sensor_set: BTreeSet<SensorType> = sensors.iter().copied().collect();

        let mut queries = Vec::new();
        for sensor in sensor_set {
            for window in &merged {
                for chunk in self.split_for_page_limit(sensor, *window) {
                    queries.push(CatalogQuery {
                        sensors: vec![sensor],
                        spatial: spatial.clone(),
                        window: chunk,
                        max_cloud_pct: sensor
                            .is_optical()
                            .then_some(self.config.cloud_ceiling_pct),
                        limit: self.config.page_limit,
                    });
                }
            }
        }

        log::info!(
            "Planned {} catalog query(ies) over {} window(s), coarse: {}",
            queries.len(),
            merged.len(),
            spatial.is_coarse()
        );
        queries
    }

    fn split_for_page_limit(&self, sensor: SensorType, window: TimeWindow) -> Vec<TimeWindow> {
        let expected = daily_scene_density(sensor) * window.days();
        if expected <= self.config.page_limit as f64 {
            return vec![window];
        }
        let parts = (expected / self.config.page_limit as f64).ceil() as usize;
        log::debug!(
            "{}: ~{:.0} expected scenes exceed page limit {}, splitting into {} windows",
            sensor,
            expected,
            self.config.page_limit,
            parts
        );
        window.split_even(parts)
    }
}

/// Collapse overlapping or boundary-sharing windows into their union
fn merge_windows(windows: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut sorted = windows.to_vec();
    sorted.sort_by_key(|w| (w.start, w.end));

    let mut merged: Vec<TimeWindow> = Vec::new();
    for window in sorted {
        match merged.last_mut() {
            Some(last) if last.touches(&window) => *last = last.merge(&window),
            _ => merged.push(window),
        }
    }
    merged
}
