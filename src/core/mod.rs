//! Core selection pipeline modules

pub mod dispatch;
pub mod filter;
pub mod planner;
pub mod scorer;
pub mod selection;

// Re-export main types
pub use dispatch::{
    CorrectionEvent, MaskAlgorithm, MaskArtifactRef, MaskJobHandle, MaskOutput,
    MaskPipelineDispatcher,
};
pub use filter::{AssetFilter, RejectReason};
pub use planner::QueryPlanner;
pub use scorer::AssetScorer;
pub use selection::SelectionEngine;
