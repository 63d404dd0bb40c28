//! Parallel spatial-overlap engine
//!
//! Partitions the grid into contiguous chunks, computes per-chunk/per-layer
//! intersection areas on a fixed-size worker pool, and merges the results
//! into one canonical table. The final table is identical for any pool size:
//! every planning unit is processed exactly once and the merge always
//! re-sorts into canonical order.

pub mod partition;

pub use partition::chunk_ranges;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{Area, BooleanOps, Intersects, Polygon};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{PlanningError, Result};
use crate::grid::{Grid, PlanningUnit};
use crate::layer::{AttrValue, AttributeKeys, ConservationLayer};
use crate::table::{IntersectionRecord, IntersectionTable};

/// Classification of a non-fatal overlap problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Overlap was requested with an empty grid or no layers
    EmptyInput,
    /// A layer had no features and was skipped
    EmptyLayer,
    /// A layer or feature was structurally unusable (wrong CRS, missing id)
    Input,
    /// A malformed polygon was skipped
    Geometry,
    /// A worker task failed; its (chunk, layer) contribution was dropped
    Worker,
}

/// A non-fatal problem reported alongside the overlap table
///
/// Everything except configuration errors degrades to a diagnostic: the
/// offending layer, feature or chunk is dropped and the rest of the run is
/// unaffected.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Problem classification
    pub kind: DiagnosticKind,
    /// Layer the problem occurred in, when layer-scoped
    pub layer: Option<String>,
    /// Grid chunk the problem occurred in, when chunk-scoped
    pub chunk: Option<usize>,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    fn layer_scoped(kind: DiagnosticKind, layer: &str, message: String) -> Self {
        Self {
            kind,
            layer: Some(layer.to_string()),
            chunk: None,
            message,
        }
    }

    fn chunk_scoped(kind: DiagnosticKind, layer: &str, chunk: usize, message: String) -> Self {
        Self {
            kind,
            layer: Some(layer.to_string()),
            chunk: Some(chunk),
            message,
        }
    }
}

/// Result of one overlap run: the table plus everything that was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapReport {
    /// Canonical intersection table
    pub table: IntersectionTable,
    /// Non-fatal problems encountered during the run
    pub diagnostics: Vec<Diagnostic>,
}

impl OverlapReport {
    fn empty_with(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            table: IntersectionTable::new(),
            diagnostics,
        }
    }
}

/// The partition/compute/merge overlap engine
///
/// Owns a dedicated worker pool of exactly the configured size; the pool
/// size is explicit configuration and never an implicit global core count.
///
/// # Example
///
/// ```rust,no_run
/// use hexgrid_planner::*;
///
/// # fn demo(grid: Grid, layers: Vec<ConservationLayer>) {
/// let engine = OverlapEngine::new(4).unwrap();
/// let report = engine.run(&grid, &layers);
/// for record in &report.table {
///     println!("{} {} {}", record.feature_id, record.puid, record.amount);
/// }
/// # }
/// ```
pub struct OverlapEngine {
    pool: rayon::ThreadPool,
    workers: usize,
    keys: AttributeKeys,
    verbose: bool,
}

impl OverlapEngine {
    /// Create an engine with the given worker-pool size and default keys
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `workers` is zero or the pool cannot be
    /// built.
    pub fn new(workers: usize) -> Result<Self> {
        Self::with_options(workers, AttributeKeys::default(), false)
    }

    /// Create an engine from a session configuration
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::with_options(config.workers, config.keys.clone(), config.verbose)
    }

    fn with_options(workers: usize, keys: AttributeKeys, verbose: bool) -> Result<Self> {
        if workers == 0 {
            return Err(PlanningError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| {
                PlanningError::InvalidConfig(format!("cannot build worker pool: {}", e))
            })?;

        Ok(Self {
            pool,
            workers,
            keys,
            verbose,
        })
    }

    /// Worker-pool size
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Compute the overlap table for a grid against a set of layers
    ///
    /// The grid and layers are read-only; the layers must already be
    /// expressed in the grid's CRS (see [`crate::crs::project`]). Empty
    /// inputs yield an empty table plus a diagnostic, never an error, and a
    /// failure in one (chunk, layer) task drops only that contribution.
    ///
    /// Blocks until every dispatched task has returned. There is no
    /// cancellation or timeout: a stuck worker stalls the whole overlap
    /// step.
    pub fn run(&self, grid: &Grid, layers: &[ConservationLayer]) -> OverlapReport {
        let mut diagnostics = Vec::new();

        if grid.is_empty() {
            warn!("overlap requested with an empty grid");
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::EmptyInput,
                layer: None,
                chunk: None,
                message: "grid has no planning units".to_string(),
            });
            return OverlapReport::empty_with(diagnostics);
        }
        if layers.is_empty() {
            warn!("overlap requested with no conservation layers");
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::EmptyInput,
                layer: None,
                chunk: None,
                message: "no conservation layers".to_string(),
            });
            return OverlapReport::empty_with(diagnostics);
        }

        let prepared = self.prepare_layers(grid, layers, &mut diagnostics);
        if prepared.is_empty() {
            warn!("no usable conservation layers after preparation");
            return OverlapReport::empty_with(diagnostics);
        }

        let ranges = partition::chunk_ranges(grid.unit_count(), self.workers);
        if self.verbose {
            info!(
                units = grid.unit_count(),
                chunks = ranges.len(),
                workers = self.workers,
                layers = prepared.len(),
                "dispatching overlap computation"
            );
        }

        // Fan out one task per chunk and join all of them; collect() keeps
        // chunk order, and the canonical sort below makes the result
        // independent of worker completion order anyway.
        let outcomes: Vec<ChunkOutcome> = self.pool.install(|| {
            ranges
                .par_iter()
                .enumerate()
                .map(|(chunk, range)| {
                    process_chunk(chunk, &grid.units()[range.clone()], &prepared, &self.keys)
                })
                .collect()
        });

        let mut records = Vec::new();
        for outcome in outcomes {
            records.extend(outcome.records);
            diagnostics.extend(outcome.diagnostics);
        }

        let table = IntersectionTable::from_records(records);
        if self.verbose {
            info!(records = table.len(), "overlap computation complete");
        }

        OverlapReport { table, diagnostics }
    }

    fn prepare_layers<'a>(
        &self,
        grid: &Grid,
        layers: &'a [ConservationLayer],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<PreparedLayer<'a>> {
        let mut prepared = Vec::with_capacity(layers.len());
        for layer in layers {
            if layer.is_empty() {
                warn!(layer = layer.name.as_str(), "layer is empty; skipped");
                diagnostics.push(Diagnostic::layer_scoped(
                    DiagnosticKind::EmptyLayer,
                    &layer.name,
                    "layer has no features".to_string(),
                ));
                continue;
            }
            match layer.crs.as_deref() {
                Some(def) if grid.crs().matches(def) => {}
                Some(def) => {
                    warn!(
                        layer = layer.name.as_str(),
                        crs = def,
                        "layer CRS differs from the grid CRS; skipped"
                    );
                    diagnostics.push(Diagnostic::layer_scoped(
                        DiagnosticKind::Input,
                        &layer.name,
                        format!(
                            "layer CRS {:?} differs from grid CRS {:?}; project it first",
                            def,
                            grid.crs().definition()
                        ),
                    ));
                    continue;
                }
                None => {
                    warn!(layer = layer.name.as_str(), "layer has no CRS; skipped");
                    diagnostics.push(Diagnostic::layer_scoped(
                        DiagnosticKind::Input,
                        &layer.name,
                        "layer has no CRS".to_string(),
                    ));
                    continue;
                }
            }
            let Some(hull) = layer.convex_hull() else {
                diagnostics.push(Diagnostic::layer_scoped(
                    DiagnosticKind::Geometry,
                    &layer.name,
                    "layer has no usable geometry".to_string(),
                ));
                continue;
            };
            prepared.push(PreparedLayer { layer, hull });
        }
        prepared
    }
}

/// A layer admitted to the parallel stage, with its precomputed hull
struct PreparedLayer<'a> {
    layer: &'a ConservationLayer,
    hull: Polygon<f64>,
}

struct ChunkOutcome {
    records: Vec<IntersectionRecord>,
    diagnostics: Vec<Diagnostic>,
}

fn process_chunk(
    chunk: usize,
    units: &[PlanningUnit],
    prepared: &[PreparedLayer<'_>],
    keys: &AttributeKeys,
) -> ChunkOutcome {
    let mut records = Vec::new();
    let mut diagnostics = Vec::new();

    for layer in prepared {
        // The task boundary: a panic inside one (chunk, layer) computation
        // drops that contribution and leaves every sibling task untouched.
        match catch_unwind(AssertUnwindSafe(|| layer_records(chunk, units, layer, keys))) {
            Ok((layer_recs, layer_diags)) => {
                records.extend(layer_recs);
                diagnostics.extend(layer_diags);
            }
            Err(payload) => {
                let error = PlanningError::Worker {
                    chunk,
                    message: panic_message(payload),
                };
                warn!(
                    layer = layer.layer.name.as_str(),
                    chunk, "{error}; contribution dropped"
                );
                diagnostics.push(Diagnostic::chunk_scoped(
                    DiagnosticKind::Worker,
                    &layer.layer.name,
                    chunk,
                    error.to_string(),
                ));
            }
        }
    }

    ChunkOutcome {
        records,
        diagnostics,
    }
}

fn layer_records(
    chunk: usize,
    units: &[PlanningUnit],
    prepared: &PreparedLayer<'_>,
    keys: &AttributeKeys,
) -> (Vec<IntersectionRecord>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    // Convex-hull pre-filter: cheap outer bound, performance only. Any unit
    // truly intersecting a feature also intersects the hull, so nothing real
    // is excluded here.
    let candidates: Vec<&PlanningUnit> = units
        .iter()
        .filter(|unit| unit.geometry.intersects(&prepared.hull))
        .collect();
    if candidates.is_empty() {
        return (Vec::new(), diagnostics);
    }

    // Areas are summed per (puid, feature id) across every intersecting
    // fragment before rounding once at emission.
    let mut sums: BTreeMap<(u32, AttrValue), f64> = BTreeMap::new();

    for (index, feature) in prepared.layer.features.iter().enumerate() {
        if !feature.has_valid_geometry() {
            diagnostics.push(Diagnostic::chunk_scoped(
                DiagnosticKind::Geometry,
                &prepared.layer.name,
                chunk,
                format!("feature {} has unusable geometry; skipped", index),
            ));
            continue;
        }
        let Some(feature_id) = feature.attribute(&keys.id) else {
            diagnostics.push(Diagnostic::chunk_scoped(
                DiagnosticKind::Input,
                &prepared.layer.name,
                chunk,
                format!("feature {} has no {:?} attribute; skipped", index, keys.id),
            ));
            continue;
        };

        for unit in &candidates {
            if !unit.geometry.intersects(&feature.geometry) {
                continue;
            }
            let area = unit
                .geometry
                .intersection(&feature.geometry)
                .unsigned_area();
            if area > 0.0 {
                *sums.entry((unit.puid, feature_id.clone())).or_insert(0.0) += area;
            }
        }
    }

    let records = sums
        .into_iter()
        .filter_map(|((puid, feature_id), area)| {
            let amount = area.round() as u64;
            (amount > 0).then_some(IntersectionRecord {
                puid,
                feature_id,
                amount,
            })
        })
        .collect();

    (records, diagnostics)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SessionConfigBuilder};
    use crate::layer::Feature;
    use geo::{polygon, Rect};
    use glam::DVec2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const CRS: &str = "EPSG:3857";

    fn test_config(cell_area: f64) -> SessionConfig {
        SessionConfigBuilder::new()
            .target_crs(CRS)
            .unwrap()
            .cell_area(cell_area)
            .unwrap()
            .build()
            .unwrap()
    }

    fn test_grid(extent: f64, cell_area: f64) -> Grid {
        let bounds = Rect::new(
            geo::coord! { x: 0.0, y: 0.0 },
            geo::coord! { x: extent, y: extent },
        );
        Grid::generate("test", bounds, &test_config(cell_area)).unwrap()
    }

    fn square(center: DVec2, side: f64) -> geo::Polygon<f64> {
        let h = side / 2.0;
        polygon![
            (x: center.x - h, y: center.y - h),
            (x: center.x + h, y: center.y - h),
            (x: center.x + h, y: center.y + h),
            (x: center.x - h, y: center.y + h),
        ]
    }

    fn layer_with(name: &str, features: Vec<Feature>) -> ConservationLayer {
        let mut layer = ConservationLayer::new(name, Some(CRS));
        layer.features = features;
        layer
    }

    #[test]
    fn test_empty_grid_returns_warning_not_error() {
        let empty = Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 0.0, y: 5.0 });
        let grid = Grid::generate("empty", empty, &test_config(100.0)).unwrap();
        let layers = vec![layer_with(
            "a",
            vec![Feature::new(square(DVec2::new(1.0, 1.0), 1.0)).with_attribute("ID", 1)],
        )];

        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &layers);

        assert!(report.table.is_empty());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::EmptyInput));
    }

    #[test]
    fn test_no_layers_returns_warning_not_error() {
        let grid = test_grid(100.0, 500.0);
        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &[]);

        assert!(report.table.is_empty());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::EmptyInput));
    }

    #[test]
    fn test_contained_feature_yields_one_exact_record() {
        let grid = test_grid(300.0, 2_000.0);
        let unit = &grid.units()[10];

        // a 10x10 square centered on the unit fits well inside the hexagon
        // (inradius ~= 24.0 for a 2000-area hexagon)
        let contained = square(unit.center, 10.0);
        let layers = vec![layer_with(
            "habitat",
            vec![Feature::new(contained).with_attribute("ID", 42)],
        )];

        let engine = OverlapEngine::new(3).unwrap();
        let report = engine.run(&grid, &layers);

        assert_eq!(report.table.len(), 1);
        let record = &report.table.records()[0];
        assert_eq!(record.puid, unit.puid);
        assert_eq!(record.feature_id, AttrValue::Int(42));
        assert_eq!(record.amount, 100);
    }

    #[test]
    fn test_disjoint_feature_yields_no_records() {
        let grid = test_grid(200.0, 1_000.0);
        let layers = vec![layer_with(
            "far-away",
            vec![Feature::new(square(DVec2::new(9_000.0, 9_000.0), 50.0)).with_attribute("ID", 1)],
        )];

        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &layers);

        assert!(report.table.is_empty());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_empty_layer_skipped_with_warning() {
        let grid = test_grid(200.0, 1_000.0);
        let unit = &grid.units()[3];
        let layers = vec![
            layer_with("empty", vec![]),
            layer_with(
                "full",
                vec![Feature::new(square(unit.center, 8.0)).with_attribute("ID", 5)],
            ),
        ];

        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &layers);

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table.records()[0].feature_id, AttrValue::Int(5));
        let empties: Vec<&Diagnostic> = report
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::EmptyLayer)
            .collect();
        assert_eq!(empties.len(), 1);
        assert_eq!(empties[0].layer.as_deref(), Some("empty"));
    }

    #[test]
    fn test_mismatched_layer_crs_skipped() {
        let grid = test_grid(200.0, 1_000.0);
        let mut layer = layer_with(
            "wrong-crs",
            vec![Feature::new(square(DVec2::new(50.0, 50.0), 10.0)).with_attribute("ID", 1)],
        );
        layer.crs = Some("EPSG:4326".to_string());

        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &[layer]);

        assert!(report.table.is_empty());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Input));
    }

    #[test]
    fn test_malformed_feature_skipped_but_layer_continues() {
        let grid = test_grid(200.0, 1_000.0);
        let unit = &grid.units()[5];

        let broken = Feature::new(polygon![
            (x: f64::NAN, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ])
        .with_attribute("ID", 1);
        let good = Feature::new(square(unit.center, 6.0)).with_attribute("ID", 2);

        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &[layer_with("mixed", vec![broken, good])]);

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table.records()[0].feature_id, AttrValue::Int(2));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Geometry));
    }

    #[test]
    fn test_missing_id_attribute_skipped() {
        let grid = test_grid(200.0, 1_000.0);
        let unit = &grid.units()[2];
        let anonymous = Feature::new(square(unit.center, 6.0));

        let engine = OverlapEngine::new(1).unwrap();
        let report = engine.run(&grid, &[layer_with("anon", vec![anonymous])]);

        assert!(report.table.is_empty());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Input));
    }

    #[test]
    fn test_fragments_sum_before_rounding() {
        let grid = test_grid(300.0, 2_000.0);
        let unit = &grid.units()[8];

        // two disjoint fragments of the same feature id inside one unit,
        // each with area 10.3: summing first gives round(20.6) = 21, while
        // per-fragment rounding would give 10 + 10 = 20
        let side = 10.3_f64.sqrt();
        let a = square(unit.center + DVec2::new(-8.0, 0.0), side);
        let b = square(unit.center + DVec2::new(8.0, 0.0), side);
        let layers = vec![layer_with(
            "fragments",
            vec![
                Feature::new(a).with_attribute("ID", 9),
                Feature::new(b).with_attribute("ID", 9),
            ],
        )];

        let engine = OverlapEngine::new(2).unwrap();
        let report = engine.run(&grid, &layers);

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table.records()[0].amount, 21);
    }

    fn random_layers(seed: u64, extent: f64) -> Vec<ConservationLayer> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut layers = Vec::new();
        for layer_index in 0..3 {
            let features = (0..12)
                .map(|i| {
                    let cx = rng.gen_range(0.0..extent);
                    let cy = rng.gen_range(0.0..extent);
                    let side = rng.gen_range(5.0..40.0);
                    // feature ids are globally unique across layers, as
                    // species ids are in real datasets
                    Feature::new(square(DVec2::new(cx, cy), side))
                        .with_attribute("ID", (layer_index * 100 + i) as i64)
                })
                .collect();
            layers.push(layer_with(&format!("layer-{}", layer_index), features));
        }
        layers
    }

    #[test]
    fn test_deterministic_across_worker_counts() {
        let grid = test_grid(400.0, 1_500.0);
        let layers = random_layers(7, 400.0);

        let baseline = OverlapEngine::new(1).unwrap().run(&grid, &layers);
        assert!(!baseline.table.is_empty());

        for workers in [2, 4] {
            let report = OverlapEngine::new(workers).unwrap().run(&grid, &layers);
            assert_eq!(
                report.table, baseline.table,
                "table differs with {} workers",
                workers
            );
        }
    }

    #[test]
    fn test_each_pair_computed_at_most_once() {
        let grid = test_grid(300.0, 1_500.0);
        let layers = random_layers(11, 300.0);

        let report = OverlapEngine::new(4).unwrap().run(&grid, &layers);

        let mut seen = std::collections::HashSet::new();
        for record in &report.table {
            assert!(
                seen.insert((record.puid, record.feature_id.clone())),
                "duplicate record for ({}, {:?})",
                record.puid,
                record.feature_id
            );
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(OverlapEngine::new(0).is_err());
    }
}
