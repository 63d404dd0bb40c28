//! Conservation-feature layers
//!
//! An attributed polygon collection as loaded from external vector storage,
//! plus the attribute-key configuration and the filtering used to narrow a
//! loaded set of layers down to a working subset before overlap.

use std::collections::BTreeMap;

use geo::{BoundingRect, ConvexHull, MultiPoint, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// An attribute value read from a layer
///
/// Identifier fields are integers in most datasets and free text in the
/// rest, so both are supported. The derived ordering (integers before text,
/// each compared naturally) makes attribute values usable as canonical sort
/// keys for the overlap table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttrValue {
    /// Integer attribute
    Int(i64),
    /// Text attribute
    Text(String),
}

impl AttrValue {
    /// Parse a raw field: integers become `Int`, everything else `Text`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(value) => AttrValue::Int(value),
            Err(_) => AttrValue::Text(raw.to_string()),
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(value) => write!(f, "{}", value),
            AttrValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

/// One attributed polygon inside a conservation layer
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Named attributes carried alongside the geometry
    pub attributes: BTreeMap<String, AttrValue>,
    /// Feature polygon, expressed in the owning layer's CRS
    pub geometry: Polygon<f64>,
}

impl Feature {
    /// Create a feature with no attributes
    pub fn new(geometry: Polygon<f64>) -> Self {
        Self {
            attributes: BTreeMap::new(),
            geometry,
        }
    }

    /// Attach an attribute, builder style
    pub fn with_attribute(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Look up an attribute by key
    #[inline]
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Whether the geometry is usable for clipping and intersection
    ///
    /// A closed exterior ring needs at least four coordinates, and every
    /// coordinate must be finite.
    pub fn has_valid_geometry(&self) -> bool {
        let exterior = self.geometry.exterior();
        if exterior.0.len() < 4 {
            return false;
        }
        let finite = |ring: &geo::LineString<f64>| {
            ring.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
        };
        finite(exterior) && self.geometry.interiors().iter().all(finite)
    }
}

/// An attributed polygon collection
///
/// Loaded values carry geometry, an optional CRS definition and named
/// attributes; the crate does not define the on-disk format. The CRS stays a
/// raw string until the layer passes through the CRS manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConservationLayer {
    /// Display name (file stem or dataset title)
    pub name: String,
    /// CRS definition as declared by the source, if any
    pub crs: Option<String>,
    /// Member features
    pub features: Vec<Feature>,
}

impl ConservationLayer {
    /// Create an empty layer
    pub fn new(name: &str, crs: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            crs: crs.map(|c| c.to_string()),
            features: Vec::new(),
        }
    }

    /// Number of features
    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding rectangle over all feature geometries
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let mut bounds: Option<Rect<f64>> = None;
        for feature in &self.features {
            let Some(rect) = feature.geometry.bounding_rect() else {
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

    /// Convex hull over all feature vertices
    ///
    /// A cheap outer bound for pre-filtering; never authoritative for
    /// intersection results. `None` for layers without enough geometry.
    pub fn convex_hull(&self) -> Option<Polygon<f64>> {
        let points: Vec<Point<f64>> = self
            .features
            .iter()
            .filter(|f| f.has_valid_geometry())
            .flat_map(|f| f.geometry.exterior().0.iter().map(|c| Point::from(*c)))
            .collect();
        if points.len() < 3 {
            return None;
        }
        Some(MultiPoint::from(points).convex_hull())
    }
}

/// Attribute key names used to read layer and grid fields
///
/// Exact key strings are dataset configuration, not structure; the defaults
/// match the conventional column names of the consumed datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeKeys {
    /// Feature identifier field
    pub id: String,
    /// Feature class field
    pub class: String,
    /// Feature group field
    pub group: String,
    /// Feature display-name field
    pub name: String,
    /// Planning-unit identifier field on saved grids
    pub puid: String,
}

impl Default for AttributeKeys {
    fn default() -> Self {
        Self {
            id: "ID".to_string(),
            class: "CLASS_TYPE".to_string(),
            group: "GROUP_".to_string(),
            name: "NAME".to_string(),
            puid: "GRID_ID".to_string(),
        }
    }
}

/// Which attribute field a [`LayerFilter`] matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterField {
    /// Identifier field
    Id,
    /// Class field
    Class,
    /// Group field
    Group,
    /// Name field
    Name,
}

impl FilterField {
    /// Resolve the configured key string for this field
    pub fn key<'a>(&self, keys: &'a AttributeKeys) -> &'a str {
        match self {
            FilterField::Id => &keys.id,
            FilterField::Class => &keys.class,
            FilterField::Group => &keys.group,
            FilterField::Name => &keys.name,
        }
    }
}

/// A working-subset filter over conservation layers
///
/// Filtering always operates on fresh copies of the originally loaded
/// layers, never on previously filtered output, so repeated queries cannot
/// compound.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFilter {
    /// Field to match
    pub field: FilterField,
    /// Values accepted for that field
    pub values: Vec<AttrValue>,
}

impl LayerFilter {
    /// Create a filter keeping features whose `field` matches any of `values`
    pub fn new(field: FilterField, values: Vec<AttrValue>) -> Self {
        Self { field, values }
    }

    /// Apply the filter to the originally loaded layers
    ///
    /// Returns one fresh layer per input layer, containing only matching
    /// features. Layers left empty by the filter are retained so the overlap
    /// engine can report them instead of silently dropping them.
    pub fn apply(
        &self,
        layers: &[ConservationLayer],
        keys: &AttributeKeys,
    ) -> Vec<ConservationLayer> {
        let key = self.field.key(keys);
        layers
            .iter()
            .map(|layer| ConservationLayer {
                name: layer.name.clone(),
                crs: layer.crs.clone(),
                features: layer
                    .features
                    .iter()
                    .filter(|f| {
                        f.attribute(key)
                            .map(|v| self.values.contains(v))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]
    }

    #[test]
    fn test_attr_value_parse() {
        assert_eq!(AttrValue::parse("42"), AttrValue::Int(42));
        assert_eq!(AttrValue::parse(" -3 "), AttrValue::Int(-3));
        assert_eq!(
            AttrValue::parse("wetland"),
            AttrValue::Text("wetland".to_string())
        );
        assert_eq!(AttrValue::parse("3.5"), AttrValue::Text("3.5".to_string()));
    }

    #[test]
    fn test_attr_value_ordering() {
        let mut values = vec![
            AttrValue::from("b"),
            AttrValue::Int(10),
            AttrValue::from("a"),
            AttrValue::Int(2),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                AttrValue::Int(2),
                AttrValue::Int(10),
                AttrValue::from("a"),
                AttrValue::from("b"),
            ]
        );
    }

    #[test]
    fn test_feature_geometry_validity() {
        let good = Feature::new(unit_square());
        assert!(good.has_valid_geometry());

        let degenerate = Feature::new(Polygon::new(geo::LineString::new(vec![]), vec![]));
        assert!(!degenerate.has_valid_geometry());

        let non_finite = Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 1.0, y: 1.0),
        ]);
        assert!(!non_finite.has_valid_geometry());
    }

    #[test]
    fn test_attribute_keys_defaults() {
        let keys = AttributeKeys::default();
        assert_eq!(keys.id, "ID");
        assert_eq!(keys.class, "CLASS_TYPE");
        assert_eq!(keys.group, "GROUP_");
        assert_eq!(keys.name, "NAME");
        assert_eq!(keys.puid, "GRID_ID");
    }

    fn sample_layers() -> Vec<ConservationLayer> {
        let mut layer = ConservationLayer::new("habitats", Some("EPSG:3857"));
        layer.features = vec![
            Feature::new(unit_square())
                .with_attribute("ID", 1)
                .with_attribute("CLASS_TYPE", "wetland"),
            Feature::new(unit_square())
                .with_attribute("ID", 2)
                .with_attribute("CLASS_TYPE", "forest"),
            Feature::new(unit_square()).with_attribute("ID", 3),
        ];
        vec![layer]
    }

    #[test]
    fn test_filter_matches_class() {
        let layers = sample_layers();
        let keys = AttributeKeys::default();
        let filter = LayerFilter::new(FilterField::Class, vec![AttrValue::from("wetland")]);

        let filtered = filter.apply(&layers, &keys);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].len(), 1);
        assert_eq!(
            filtered[0].features[0].attribute("ID"),
            Some(&AttrValue::Int(1))
        );
        // features without the field never match
        let original_count = layers[0].len();
        assert_eq!(original_count, 3);
    }

    #[test]
    fn test_filter_never_mutates_input() {
        let layers = sample_layers();
        let keys = AttributeKeys::default();
        let filter = LayerFilter::new(FilterField::Id, vec![AttrValue::Int(2)]);

        let first = filter.apply(&layers, &keys);
        let second = filter.apply(&layers, &keys);

        assert_eq!(first, second);
        assert_eq!(layers[0].len(), 3);
    }

    #[test]
    fn test_convex_hull_and_bounds() {
        let layers = sample_layers();
        let hull = layers[0].convex_hull().unwrap();
        assert!(hull.exterior().0.len() >= 4);

        let bounds = layers[0].bounding_rect().unwrap();
        assert_eq!(bounds.min().x, 0.0);
        assert_eq!(bounds.max().y, 1.0);

        let empty = ConservationLayer::new("empty", None);
        assert!(empty.convex_hull().is_none());
        assert!(empty.bounding_rect().is_none());
    }
}
