//! Hexagonal planning-unit grids and parallel overlap tables
//!
//! A library for systematic conservation planning input preparation: tile an
//! area of interest with equal-area hexagonal planning units, align
//! conservation-feature layers to one projected CRS, and compute a sparse,
//! deterministic (planning unit × feature) overlap-area table for a
//! downstream optimization tool.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hexgrid_planner::*;
//! use geo::Rect;
//!
//! // One explicit configuration value, threaded through every call
//! let config = SessionConfigBuilder::new()
//!     .target_crs("EPSG:3857").unwrap()
//!     .cell_area_text("1 km2").unwrap()
//!     .workers(4).unwrap()
//!     .build().unwrap();
//!
//! // Tile the area of interest
//! let bounds = Rect::new(
//!     geo::coord! { x: 0.0, y: 0.0 },
//!     geo::coord! { x: 50_000.0, y: 50_000.0 },
//! );
//! let grid = Grid::generate("study-area", bounds, &config).unwrap();
//!
//! // Align layers and compute the overlap table
//! # let loaded: Vec<ConservationLayer> = vec![];
//! let layers: Vec<ConservationLayer> = loaded
//!     .iter()
//!     .map(|layer| crs::project(layer, grid.crs()))
//!     .collect::<Result<_>>()
//!     .unwrap();
//!
//! let engine = OverlapEngine::from_config(&config).unwrap();
//! let report = engine.run(&grid, &layers);
//!
//! // Render for the downstream tool
//! write_csv(&report.table, &config.columns, std::io::stdout()).unwrap();
//! ```
//!
//! # Features
//!
//! - `spatial-index` (default): O(log n) position-to-planning-unit lookups
//!   using a KD-tree over unit centers

// Modules
pub mod error;
pub mod config;
pub mod crs;
pub mod layer;
pub mod grid;
pub mod overlap;
pub mod table;
pub mod export;
pub mod boundary;

#[cfg(feature = "spatial-index")]
pub mod spatial;

// Re-export core types for convenience
pub use error::{PlanningError, Result};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use crs::ProjectedCrs;
pub use layer::{
    AttrValue, AttributeKeys, ConservationLayer, Feature, FilterField, LayerFilter,
};
pub use grid::{Grid, PlanningUnit};
pub use overlap::{Diagnostic, DiagnosticKind, OverlapEngine, OverlapReport};
pub use table::{IntersectionRecord, IntersectionTable};
pub use export::{to_tabular, write_csv, ExportColumns};
pub use boundary::{boundary_channel, BoundaryReceiver, BoundarySource, BoundarySubmitter};

#[cfg(feature = "spatial-index")]
pub use spatial::SpatialIndex;
