//! Error types for grid generation and overlap analysis

use thiserror::Error;

/// Errors that can occur while preparing grids or computing overlaps
///
/// Only configuration problems are fatal to the step that raised them; every
/// other failure mode degrades to a skipped item plus a diagnostic so that
/// sibling layers and chunks keep processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// Configuration validation failed (unparseable or unprojected CRS,
    /// non-positive cell area, zero workers). Retryable with new input.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An input value is missing or structurally unusable (layer without a
    /// CRS, malformed boundary payload, failed export write).
    #[error("unusable input: {0}")]
    Input(String),

    /// A malformed polygon was encountered during clipping or intersection.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A parallel task failed; its contribution was dropped.
    #[error("worker failure in chunk {chunk}: {message}")]
    Worker {
        /// Index of the grid chunk the task was processing
        chunk: usize,
        /// Captured panic or failure message
        message: String,
    },
}

/// Result type alias for planning operations
pub type Result<T> = std::result::Result<T, PlanningError>;
