//! I/O collaborators: boundary sources and catalog clients

pub mod boundaries;
pub mod catalog;

// Re-export main types
pub use boundaries::{BoundaryCache, GeoBoundariesSource, GeometryResolver, GeometrySource};
pub use catalog::{CatalogClient, StacApiClient};
