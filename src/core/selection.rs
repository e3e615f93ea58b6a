use crate::config::SelectionConfig;
use crate::core::filter::AssetFilter;
use crate::core::planner::QueryPlanner;
use crate::core::scorer::AssetScorer;
use crate::io::boundaries::GeometryResolver;
use crate::io::catalog::CatalogClient;
use crate::types::{
    AssetRecord, FloodError, FloodEvent, FloodResult, RegionGeometry, SelectionResult,
};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Orchestrates resolution, planning, querying, filtering and scoring for
/// one flood event.
///
/// Holds no mutable state across invocations; independent events may be
/// selected in parallel through one shared engine. Retry policy lives in
/// the catalog client, never here.
pub struct SelectionEngine {
    config: SelectionConfig,
    resolver: GeometryResolver,
    client: Box<dyn CatalogClient>,
    planner: QueryPlanner,
    filter: AssetFilter,
    scorer: AssetScorer,
}

impl SelectionEngine {
    /// Fails on invalid configuration instead of selecting with skewed
    /// rankings.
    pub fn new(
        config: SelectionConfig,
        resolver: GeometryResolver,
        client: Box<dyn CatalogClient>,
    ) -> FloodResult<Self> {
        config.validate()?;
        Ok(Self {
            planner: QueryPlanner::new(config.clone()),
            filter: AssetFilter::new(config.clone()),
            scorer: AssetScorer::new(config.clone()),
            config,
            resolver,
            client,
        })
    }

    /// Ranked, deduplicated candidates for one event, with the issued
    /// queries as provenance.
    ///
    /// Catalog failures propagate immediately; a timeout is never treated
    /// as zero results. Zero survivors is the structured `NoCandidates`
    /// outcome, an answer the analyst needs to see rather than a crash.
    pub fn select(&self, event: &FloodEvent) -> FloodResult<SelectionResult> {
        log::info!(
            "Selecting scenes for event {} ({} flood)",
            event.id,
            event.flood_type
        );
        let geometry = self.resolver.resolve(&event.region)?;
        self.select_with_geometry(event, &geometry)
    }

    /// Variant for callers that already hold the resolved geometry (the
    /// mask dispatcher wants the same geometry later).
    pub fn select_with_geometry(
        &self,
        event: &FloodEvent,
        geometry: &RegionGeometry,
    ) -> FloodResult<SelectionResult> {
        let queries = self.planner.plan(
            geometry,
            &event.time,
            &self.config.sensors,
            self.client.supports_intersects(),
        );

        // Planned queries are independent and read-only: run them
        // concurrently, merge in plan order so completion order cannot
        // leak into the result
        let pages: Vec<FloodResult<Vec<AssetRecord>>> = queries
            .par_iter()
            .map(|query| {
                let records = self.client.query(query)?;
                Ok(self
                    .filter
                    .filter(records, geometry, &event.time, query.spatial.is_coarse()))
            })
            .collect();

        let mut accepted = Vec::new();
        for page in pages {
            accepted.extend(page?);
        }

        let unique = dedup_by_id(accepted);
        let candidates = self.scorer.score(unique, geometry, event);
        if candidates.is_empty() {
            log::warn!("No eligible imagery for event {}", event.id);
            return Err(FloodError::NoCandidates {
                event_id: event.id.clone(),
            });
        }

        Ok(SelectionResult {
            event_id: event.id.clone(),
            candidates,
            queries,
        })
    }
}

/// Collapse records sharing a catalog id, keeping the one with the most
/// complete metadata; the first arrival in merge order wins ties.
fn dedup_by_id(records: Vec<AssetRecord>) -> Vec<AssetRecord> {
    let before = records.len();
    let mut by_id: BTreeMap<String, AssetRecord> = BTreeMap::new();
    for record in records {
        match by_id.get(&record.id) {
            Some(kept) if record.metadata_completeness() <= kept.metadata_completeness() => {}
            _ => {
                by_id.insert(record.id.clone(), record);
            }
        }
    }
    if by_id.len() != before {
        log::debug!("Deduplicated {} record(s) down to {}", before, by_id.len());
    }
    by_id.into_values().collect()
}
