//! Session configuration and builder
//!
//! Every core call receives an explicit [`SessionConfig`]; there is no
//! module-level target CRS or verbosity flag anywhere in the crate.

use serde::{Deserialize, Serialize};

use crate::crs::ProjectedCrs;
use crate::error::{PlanningError, Result};
use crate::export::ExportColumns;
use crate::layer::AttributeKeys;

/// Configuration for one planning session
///
/// Groups everything the grid generator and overlap engine need: the target
/// projected CRS, the requested cell area, the worker-pool size and the
/// diagnostic verbosity, plus the attribute-key and export-column names that
/// vary between datasets.
///
/// # Example
///
/// ```rust
/// use hexgrid_planner::*;
///
/// let config = SessionConfigBuilder::new()
///     .target_crs("EPSG:3857")
///     .unwrap()
///     .cell_area_text("1 km2")
///     .unwrap()
///     .workers(4)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(config.cell_area, 1_000_000.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target projected CRS all geometries are aligned to before area math
    pub target_crs: ProjectedCrs,

    /// Requested planning-unit area in squared CRS linear units
    pub cell_area: f64,

    /// Worker-pool size for the overlap engine
    ///
    /// Explicit configuration, never an implicit global core count. The
    /// result table is identical for any value; only wall-clock time changes.
    pub workers: usize,

    /// Emit per-stage progress events (diagnostic only, no effect on results)
    pub verbose: bool,

    /// Attribute key names used to read layer and grid fields
    pub keys: AttributeKeys,

    /// Column names used when rendering the overlap table
    pub columns: ExportColumns,
}

/// Builder for creating a [`SessionConfig`] with validation
///
/// Defaults:
/// - cell_area: 1,000,000 (1 km² in a meters CRS)
/// - workers: available parallelism
/// - verbose: false
/// - keys / columns: dataset-conventional names
///
/// The target CRS has no default and must be set before `build()`.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    target_crs: Option<ProjectedCrs>,
    cell_area: f64,
    workers: usize,
    verbose: bool,
    keys: AttributeKeys,
    columns: ExportColumns,
}

impl SessionConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            target_crs: None,
            cell_area: 1_000_000.0,
            workers: default_workers(),
            verbose: false,
            keys: AttributeKeys::default(),
            columns: ExportColumns::default(),
        }
    }

    /// Set the target CRS from an `EPSG:<code>` or proj definition string
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the candidate cannot be parsed or is not a
    /// projected (linear-unit) system.
    pub fn target_crs(mut self, candidate: &str) -> Result<Self> {
        self.target_crs = Some(ProjectedCrs::validate(candidate)?);
        Ok(self)
    }

    /// Set the requested cell area in squared CRS linear units
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the area is not a finite positive number.
    pub fn cell_area(mut self, area: f64) -> Result<Self> {
        if !area.is_finite() || area <= 0.0 {
            return Err(PlanningError::InvalidConfig(format!(
                "cell area must be a positive number (got {})",
                area
            )));
        }
        self.cell_area = area;
        Ok(self)
    }

    /// Set the cell area from text with an optional unit suffix
    ///
    /// Accepted suffixes: `m2`/`m²`, `km2`/`km²`, `ha`. A bare number is
    /// taken as squared CRS linear units.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on an unknown suffix or non-positive value.
    pub fn cell_area_text(self, text: &str) -> Result<Self> {
        let area = parse_cell_area(text)?;
        self.cell_area(area)
    }

    /// Set the worker-pool size for the overlap engine
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `workers` is zero.
    pub fn workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(PlanningError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        self.workers = workers;
        Ok(self)
    }

    /// Toggle progress/diagnostic reporting
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Override the attribute key names read from layers and grid files
    pub fn attribute_keys(mut self, keys: AttributeKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Override the export column names
    pub fn export_columns(mut self, columns: ExportColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if no target CRS was set.
    pub fn build(self) -> Result<SessionConfig> {
        let target_crs = self.target_crs.ok_or_else(|| {
            PlanningError::InvalidConfig("a target CRS is required".to_string())
        })?;

        Ok(SessionConfig {
            target_crs,
            cell_area: self.cell_area,
            workers: self.workers,
            verbose: self.verbose,
            keys: self.keys,
            columns: self.columns,
        })
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parse a cell-area string with an optional unit suffix into squared meters
/// (squared CRS units for a bare number)
fn parse_cell_area(text: &str) -> Result<f64> {
    let trimmed = text.trim().to_lowercase();

    let (number, factor) = if let Some(stem) = strip_suffix(&trimmed, &["km2", "km²"]) {
        (stem, 1_000_000.0)
    } else if let Some(stem) = strip_suffix(&trimmed, &["ha"]) {
        (stem, 10_000.0)
    } else if let Some(stem) = strip_suffix(&trimmed, &["m2", "m²"]) {
        (stem, 1.0)
    } else {
        (trimmed.as_str(), 1.0)
    };

    let value: f64 = number.trim().parse().map_err(|_| {
        PlanningError::InvalidConfig(format!("cannot parse cell area from {:?}", text))
    })?;

    if !value.is_finite() || value <= 0.0 {
        return Err(PlanningError::InvalidConfig(format!(
            "cell area must be positive (got {:?})",
            text
        )));
    }

    Ok(value * factor)
}

fn strip_suffix<'a>(text: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|s| text.strip_suffix(s))
}
