//! Coordinate-reference-system management
//!
//! Validates that a CRS is projected (linear-unit) before any area math is
//! allowed, and reprojects attributed layers into the session target CRS.
//! Area computations on angular coordinates are meaningless, so a geographic
//! CRS is rejected here rather than producing garbage downstream.

use geo::{Coord, LineString, Polygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};
use crate::layer::{ConservationLayer, Feature};

/// A validated, projected coordinate reference system
///
/// Construction goes through [`ProjectedCrs::validate`], so holding a value
/// of this type is proof that the definition parsed and uses linear units.
/// The definition is stored in normalized form (`EPSG:<code>` for authority
/// codes, the trimmed proj string otherwise) and compared textually.
///
/// # Example
///
/// ```rust
/// use hexgrid_planner::ProjectedCrs;
///
/// let crs = ProjectedCrs::validate("epsg:3857").unwrap();
/// assert_eq!(crs.definition(), "EPSG:3857");
/// assert_eq!(crs.epsg_code(), Some(3857));
///
/// // Angular systems are rejected, not silently allowed
/// assert!(ProjectedCrs::validate("EPSG:4326").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedCrs {
    definition: String,
}

impl ProjectedCrs {
    /// Validate a candidate CRS definition
    ///
    /// Accepts `EPSG:<code>` (any case) or a proj definition string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the candidate cannot be parsed, or when
    /// it parses but is geographic (angular) or geocentric. The caller may
    /// retry with a corrected definition; the session never proceeds with an
    /// unprojected CRS.
    pub fn validate(candidate: &str) -> Result<Self> {
        let definition = normalize_definition(candidate);
        if definition.is_empty() {
            return Err(PlanningError::InvalidConfig(
                "empty CRS definition".to_string(),
            ));
        }

        let proj = parse_definition(&definition).map_err(|msg| {
            PlanningError::InvalidConfig(format!("cannot parse CRS {:?}: {}", candidate, msg))
        })?;

        if proj.is_latlong() {
            return Err(PlanningError::InvalidConfig(format!(
                "{:?} is a geographic (angular) CRS; a projected, linear-unit system is required",
                candidate
            )));
        }
        if proj.is_geocent() {
            return Err(PlanningError::InvalidConfig(format!(
                "{:?} is a geocentric CRS; a projected, linear-unit system is required",
                candidate
            )));
        }

        Ok(Self { definition })
    }

    /// The normalized definition string
    #[inline]
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// The EPSG code, if the definition is an authority code
    pub fn epsg_code(&self) -> Option<u16> {
        self.definition
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse().ok())
    }

    /// Whether a raw definition string denotes this CRS
    pub fn matches(&self, definition: &str) -> bool {
        normalize_definition(definition) == self.definition
    }

    pub(crate) fn proj(&self) -> Result<Proj> {
        parse_definition(&self.definition).map_err(|msg| {
            PlanningError::InvalidConfig(format!(
                "cannot parse CRS {:?}: {}",
                self.definition, msg
            ))
        })
    }
}

impl std::str::FromStr for ProjectedCrs {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self> {
        Self::validate(s)
    }
}

impl std::fmt::Display for ProjectedCrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.definition)
    }
}

/// Reproject a layer into the target CRS
///
/// Returns a new layer expressed in `target`; the source layer is never
/// mutated. When the layer already is in the target CRS, a defensive copy is
/// returned without any projection call. All attributes and the display name
/// are preserved.
///
/// # Errors
///
/// - `Input` when the layer carries no CRS or its CRS cannot be parsed
/// - `Geometry` when a coordinate cannot be transformed
pub fn project(layer: &ConservationLayer, target: &ProjectedCrs) -> Result<ConservationLayer> {
    let source_def = layer.crs.as_deref().ok_or_else(|| {
        PlanningError::Input(format!(
            "layer {:?} has no CRS and cannot be projected",
            layer.name
        ))
    })?;

    if target.matches(source_def) {
        let mut copy = layer.clone();
        copy.crs = Some(target.definition().to_string());
        return Ok(copy);
    }

    let source = parse_definition(&normalize_definition(source_def)).map_err(|msg| {
        PlanningError::Input(format!(
            "layer {:?} has an unusable CRS {:?}: {}",
            layer.name, source_def, msg
        ))
    })?;
    let destination = target.proj()?;

    let features = layer
        .features
        .iter()
        .map(|feature| {
            Ok(Feature {
                attributes: feature.attributes.clone(),
                geometry: project_polygon(&source, &destination, &feature.geometry)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ConservationLayer {
        name: layer.name.clone(),
        crs: Some(target.definition().to_string()),
        features,
    })
}

/// Transform one polygon between two parsed systems
pub(crate) fn project_polygon(
    source: &Proj,
    destination: &Proj,
    polygon: &Polygon<f64>,
) -> Result<Polygon<f64>> {
    let exterior = project_ring(source, destination, polygon.exterior())?;
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| project_ring(source, destination, ring))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn project_ring(
    source: &Proj,
    destination: &Proj,
    ring: &LineString<f64>,
) -> Result<LineString<f64>> {
    let mut coords = Vec::with_capacity(ring.0.len());
    for coord in &ring.0 {
        coords.push(project_coord(source, destination, *coord)?);
    }
    Ok(LineString::from(coords))
}

fn project_coord(source: &Proj, destination: &Proj, coord: Coord<f64>) -> Result<Coord<f64>> {
    // proj4rs expects angular coordinates in radians
    let mut point = if source.is_latlong() {
        (coord.x.to_radians(), coord.y.to_radians(), 0.0)
    } else {
        (coord.x, coord.y, 0.0)
    };

    transform(source, destination, &mut point).map_err(|e| {
        PlanningError::Geometry(format!(
            "cannot transform coordinate ({}, {}): {}",
            coord.x, coord.y, e
        ))
    })?;

    let (x, y) = if destination.is_latlong() {
        (point.0.to_degrees(), point.1.to_degrees())
    } else {
        (point.0, point.1)
    };

    Ok(Coord { x, y })
}

/// Parse any CRS definition, projected or not
///
/// Used both by [`ProjectedCrs::validate`] and when reprojecting layers whose
/// source CRS is geographic.
fn parse_definition(definition: &str) -> std::result::Result<Proj, String> {
    let normalized = normalize_definition(definition);
    if let Some(code) = normalized.strip_prefix("EPSG:") {
        let code: u16 = code
            .parse()
            .map_err(|_| format!("{:?} is not a numeric EPSG code", code))?;
        Proj::from_epsg_code(code).map_err(|e| e.to_string())
    } else {
        Proj::from_proj_string(&normalized).map_err(|e| e.to_string())
    }
}

fn normalize_definition(candidate: &str) -> String {
    let trimmed = candidate.trim();
    let lower = trimmed.to_ascii_lowercase();
    if let Some(code) = lower.strip_prefix("epsg:") {
        format!("EPSG:{}", code.trim())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::AttrValue;
    use geo::polygon;

    const UTM_33N: &str = "+proj=utm +zone=33 +datum=WGS84 +units=m +no_defs";

    #[test]
    fn test_projected_crs_accepted() {
        let crs = ProjectedCrs::validate("EPSG:3857").unwrap();
        assert_eq!(crs.definition(), "EPSG:3857");
        assert_eq!(crs.epsg_code(), Some(3857));

        let utm = ProjectedCrs::validate(UTM_33N).unwrap();
        assert_eq!(utm.epsg_code(), None);
    }

    #[test]
    fn test_geographic_crs_rejected() {
        assert!(ProjectedCrs::validate("EPSG:4326").is_err());
        assert!(ProjectedCrs::validate("+proj=longlat +datum=WGS84 +no_defs").is_err());
    }

    #[test]
    fn test_unparseable_crs_rejected() {
        assert!(ProjectedCrs::validate("").is_err());
        assert!(ProjectedCrs::validate("EPSG:notanumber").is_err());
        assert!(ProjectedCrs::validate("+proj=doesnotexist").is_err());
    }

    #[test]
    fn test_normalization_and_matching() {
        let crs = ProjectedCrs::validate("  epsg:3857 ").unwrap();
        assert_eq!(crs.definition(), "EPSG:3857");
        assert!(crs.matches("EPSG:3857"));
        assert!(crs.matches("epsg:3857"));
        assert!(!crs.matches("EPSG:32633"));
    }

    fn square_layer(crs: Option<&str>) -> ConservationLayer {
        let geometry = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        let mut feature = Feature::new(geometry);
        feature
            .attributes
            .insert("ID".to_string(), AttrValue::Int(7));
        ConservationLayer {
            name: "square".to_string(),
            crs: crs.map(|c| c.to_string()),
            features: vec![feature],
        }
    }

    #[test]
    fn test_project_same_crs_is_copy() {
        let target = ProjectedCrs::validate("EPSG:3857").unwrap();
        let layer = square_layer(Some("epsg:3857"));

        let projected = project(&layer, &target).unwrap();

        assert_eq!(projected.crs.as_deref(), Some("EPSG:3857"));
        assert_eq!(projected.features[0].geometry, layer.features[0].geometry);
        // source untouched
        assert_eq!(layer.crs.as_deref(), Some("epsg:3857"));
    }

    #[test]
    fn test_project_missing_crs_is_input_error() {
        let target = ProjectedCrs::validate("EPSG:3857").unwrap();
        let layer = square_layer(None);
        assert!(matches!(
            project(&layer, &target),
            Err(PlanningError::Input(_))
        ));
    }

    #[test]
    fn test_project_geographic_to_mercator() {
        let target = ProjectedCrs::validate("EPSG:3857").unwrap();
        let layer = square_layer(Some("EPSG:4326"));

        let projected = project(&layer, &target).unwrap();
        let ring = projected.features[0].geometry.exterior();

        // lon/lat (0, 0) maps to the web-mercator origin
        assert!(ring.0[0].x.abs() < 1e-6);
        assert!(ring.0[0].y.abs() < 1e-6);
        // one degree of longitude on the equator
        assert!((ring.0[1].x - 111_319.49).abs() < 1.0);

        // attributes and name survive
        assert_eq!(
            projected.features[0].attributes.get("ID"),
            Some(&AttrValue::Int(7))
        );
        assert_eq!(projected.name, "square");
    }
}
