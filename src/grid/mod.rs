//! Planning-unit grid generation and queries
//!
//! Tiles a bounding box with equal-area hexagons, assigns stable 1-based
//! planning-unit ids in enumeration order, and offers clipping, selection
//! and storage round-trips. A grid is immutable once built: every operation
//! here returns a new `Grid` value.

pub mod hexagon;

pub use hexagon::{edge_length, hexagon_area, make_hexagon};

use geo::{Area, BoundingRect, Centroid, Intersects, Polygon, Rect};
use glam::DVec2;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::crs::{self, ProjectedCrs};
use crate::error::{PlanningError, Result};
use crate::layer::{AttrValue, AttributeKeys, ConservationLayer, Feature};

#[cfg(feature = "spatial-index")]
use crate::spatial::SpatialIndex;

/// One cell of the planning grid
///
/// `puid` is dense and 1-based within its grid. The center is carried for
/// spatial lookups and tiling diagnostics; the polygon is the authoritative
/// geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningUnit {
    /// Planning-unit identifier, unique and dense within the grid
    pub puid: u32,
    /// Hexagon center
    pub center: DVec2,
    /// Hexagon polygon in the grid's CRS
    pub geometry: Polygon<f64>,
}

/// A hexagonal planning-unit grid
///
/// All member geometries share the grid's projected CRS; a geographic CRS
/// cannot occur here because [`ProjectedCrs`] is validated at construction.
///
/// # Example
///
/// ```rust
/// use hexgrid_planner::*;
/// use geo::Rect;
///
/// let config = SessionConfigBuilder::new()
///     .target_crs("EPSG:3857")
///     .unwrap()
///     .cell_area(10_000.0)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// let bounds = Rect::new(
///     geo::coord! { x: 0.0, y: 0.0 },
///     geo::coord! { x: 1_000.0, y: 1_000.0 },
/// );
/// let grid = Grid::generate("demo", bounds, &config).unwrap();
///
/// assert!(grid.unit_count() > 0);
/// assert_eq!(grid.units()[0].puid, 1);
/// ```
#[derive(Clone)]
pub struct Grid {
    name: String,
    crs: ProjectedCrs,
    cell_area: f64,
    units: Vec<PlanningUnit>,

    #[cfg(feature = "spatial-index")]
    spatial_index: Option<SpatialIndex>,
}

impl Grid {
    /// Generate a grid covering `bounds` with hexagons of the configured area
    ///
    /// Planning-unit ids are assigned in center enumeration order
    /// (column-major, `puid = index + 1`). A degenerate extent produces an
    /// empty grid and a warning, not an error.
    pub fn generate(name: &str, bounds: Rect<f64>, config: &SessionConfig) -> Result<Self> {
        let (centers, edge) = hexagon::hex_centers(bounds, config.cell_area);

        if centers.is_empty() {
            warn!(grid = name, "extent is degenerate; grid has no planning units");
        }

        let units: Vec<PlanningUnit> = centers
            .into_iter()
            .enumerate()
            .map(|(index, center)| PlanningUnit {
                puid: index as u32 + 1,
                center,
                geometry: hexagon::make_hexagon(edge, center),
            })
            .collect();

        if config.verbose {
            info!(
                grid = name,
                units = units.len(),
                cell_area = config.cell_area,
                "generated planning-unit grid"
            );
        }

        Ok(Self::from_parts(
            name.to_string(),
            config.target_crs.clone(),
            config.cell_area,
            units,
        ))
    }

    /// Rebuild a grid from a stored attributed layer
    ///
    /// CRS policy for grid reuse: when the stored grid declares its own
    /// projected CRS, that CRS overrides the session target (re-tiling an
    /// existing grid in a new projection would distort it). A stored grid in
    /// a geographic CRS is instead reprojected onto the session target.
    ///
    /// Planning-unit ids are read from the configured puid attribute; if any
    /// are missing or duplicated the grid is densely renumbered in feature
    /// order with a warning.
    pub fn from_layer(
        layer: &ConservationLayer,
        session_target: &ProjectedCrs,
        keys: &AttributeKeys,
    ) -> Result<Self> {
        if layer.crs.is_none() {
            return Err(PlanningError::Input(format!(
                "stored grid {:?} has no CRS",
                layer.name
            )));
        }

        let (aligned, crs) = match ProjectedCrs::validate(layer.crs.as_deref().unwrap_or_default())
        {
            Ok(own) => {
                if &own != session_target {
                    info!(
                        grid = layer.name.as_str(),
                        crs = own.definition(),
                        "stored grid keeps its own projected CRS over the session target"
                    );
                }
                (layer.clone(), own)
            }
            Err(_) => (
                crs::project(layer, session_target)?,
                session_target.clone(),
            ),
        };

        let mut units = Vec::with_capacity(aligned.features.len());
        let mut stored_ids = Vec::with_capacity(aligned.features.len());
        let mut skipped = 0usize;

        for feature in &aligned.features {
            if !feature.has_valid_geometry() {
                skipped += 1;
                continue;
            }
            let center = match feature.geometry.centroid() {
                Some(point) => DVec2::new(point.x(), point.y()),
                None => {
                    skipped += 1;
                    continue;
                }
            };
            stored_ids.push(match feature.attribute(&keys.puid) {
                Some(AttrValue::Int(id)) if *id >= 1 => Some(*id as u32),
                _ => None,
            });
            units.push(PlanningUnit {
                puid: 0,
                center,
                geometry: feature.geometry.clone(),
            });
        }

        if skipped > 0 {
            warn!(
                grid = layer.name.as_str(),
                skipped, "dropped stored planning units with unusable geometry"
            );
        }

        let usable = stored_ids.iter().all(|id| id.is_some()) && {
            let mut seen = std::collections::HashSet::new();
            stored_ids.iter().flatten().all(|id| seen.insert(*id))
        };

        if usable {
            for (unit, id) in units.iter_mut().zip(&stored_ids) {
                unit.puid = id.unwrap_or(0);
            }
        } else {
            warn!(
                grid = layer.name.as_str(),
                key = keys.puid.as_str(),
                "stored planning-unit ids missing or duplicated; renumbering densely"
            );
            for (index, unit) in units.iter_mut().enumerate() {
                unit.puid = index as u32 + 1;
            }
        }

        let cell_area = mean_unit_area(&units);
        Ok(Self::from_parts(aligned.name, crs, cell_area, units))
    }

    /// Render the grid as an attributed layer for external vector storage
    pub fn to_layer(&self, keys: &AttributeKeys) -> ConservationLayer {
        ConservationLayer {
            name: self.name.clone(),
            crs: Some(self.crs.definition().to_string()),
            features: self
                .units
                .iter()
                .map(|unit| {
                    Feature::new(unit.geometry.clone())
                        .with_attribute(&keys.puid, unit.puid as i64)
                })
                .collect(),
        }
    }

    /// Keep only planning units intersecting `boundary`, renumbering densely
    ///
    /// Surviving units keep their relative enumeration order and are
    /// renumbered from 1; the renumbering never sorts spatially.
    pub fn clip_to_boundary(&self, boundary: &Polygon<f64>) -> Self {
        let units: Vec<PlanningUnit> = self
            .units
            .iter()
            .filter(|unit| unit.geometry.intersects(boundary))
            .enumerate()
            .map(|(index, unit)| PlanningUnit {
                puid: index as u32 + 1,
                center: unit.center,
                geometry: unit.geometry.clone(),
            })
            .collect();

        Self::from_parts(self.name.clone(), self.crs.clone(), self.cell_area, units)
    }

    /// Working subset of units intersecting an extent; puids are preserved
    pub fn select_by_extent(&self, extent: Rect<f64>) -> Self {
        let window = extent.to_polygon();
        self.retain(|unit| unit.geometry.intersects(&window))
    }

    /// Working subset of units intersecting a polygon; puids are preserved
    pub fn select_by_polygon(&self, polygon: &Polygon<f64>) -> Self {
        self.retain(|unit| unit.geometry.intersects(polygon))
    }

    /// Working subset of units by id; puids are preserved
    pub fn select_by_puids(&self, puids: &[u32]) -> Self {
        let wanted: std::collections::HashSet<u32> = puids.iter().copied().collect();
        self.retain(|unit| wanted.contains(&unit.puid))
    }

    fn retain(&self, keep: impl Fn(&PlanningUnit) -> bool) -> Self {
        let units: Vec<PlanningUnit> = self.units.iter().filter(|u| keep(u)).cloned().collect();
        Self::from_parts(self.name.clone(), self.crs.clone(), self.cell_area, units)
    }

    /// Grid display name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The grid's projected CRS
    #[inline]
    pub fn crs(&self) -> &ProjectedCrs {
        &self.crs
    }

    /// Requested cell area in squared CRS units
    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.cell_area
    }

    /// Number of planning units
    #[inline]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Whether the grid has no planning units
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All planning units in enumeration order
    #[inline]
    pub fn units(&self) -> &[PlanningUnit] {
        &self.units
    }

    /// Look up a planning unit by id
    pub fn get_unit(&self, puid: u32) -> Option<&PlanningUnit> {
        self.units.iter().find(|unit| unit.puid == puid)
    }

    /// Bounding rectangle over all planning units
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let mut bounds: Option<Rect<f64>> = None;
        for unit in &self.units {
            let Some(rect) = unit.geometry.bounding_rect() else {
                continue;
            };
            bounds = Some(match bounds {
                None => rect,
                Some(acc) => Rect::new(
                    geo::coord! {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    geo::coord! {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                ),
            });
        }
        bounds
    }

    /// Find the planning unit containing a position (requires `spatial-index`)
    ///
    /// Nearest-center lookup via the KD-tree, then an exact containment
    /// check so positions outside the tiling return `None`.
    #[cfg(feature = "spatial-index")]
    pub fn find_unit_at(&self, position: DVec2) -> Option<u32> {
        let index = self.spatial_index.as_ref()?;
        let unit = &self.units[index.find_nearest(position)];
        unit.geometry
            .intersects(&geo::Point::new(position.x, position.y))
            .then_some(unit.puid)
    }

    fn from_parts(
        name: String,
        crs: ProjectedCrs,
        cell_area: f64,
        units: Vec<PlanningUnit>,
    ) -> Self {
        #[cfg(feature = "spatial-index")]
        let spatial_index = if units.is_empty() {
            None
        } else {
            let centers: Vec<DVec2> = units.iter().map(|u| u.center).collect();
            Some(SpatialIndex::new(&centers))
        };

        Self {
            name,
            crs,
            cell_area,
            units,
            #[cfg(feature = "spatial-index")]
            spatial_index,
        }
    }
}

fn mean_unit_area(units: &[PlanningUnit]) -> f64 {
    if units.is_empty() {
        return 0.0;
    }
    units
        .iter()
        .map(|u| u.geometry.unsigned_area())
        .sum::<f64>()
        / units.len() as f64
}
