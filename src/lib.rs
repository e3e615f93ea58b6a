//! floodscout: A Fast, Modular Scene Selector for Flood Mapping with Sentinel-1/2
//!
//! This library turns a flood event report into a ranked shortlist of satellite
//! scenes: it resolves the affected region to a boundary geometry, plans and runs
//! STAC catalog queries, filters and scores the returned scenes, and hands the
//! survivors to a pluggable flood-mask pipeline.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AdmLevel, AssetRecord, BoundingBox, CatalogQuery, EventTime, FloodError, FloodEvent,
    FloodResult, FloodType, RegionGeometry, RegionReference, ScoreAxis, ScoredAsset,
    SelectionResult, SensorType, SpatialFilter, TimeWindow, UnitSelector,
};

pub use config::SelectionConfig;
pub use core::{
    AssetFilter, AssetScorer, CorrectionEvent, MaskAlgorithm, MaskArtifactRef, MaskJobHandle,
    MaskOutput, MaskPipelineDispatcher, QueryPlanner, RejectReason, SelectionEngine,
};
pub use io::{
    BoundaryCache, CatalogClient, GeoBoundariesSource, GeometryResolver, GeometrySource,
    StacApiClient,
};
