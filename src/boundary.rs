//! Interactive boundary capture
//!
//! The grid generator can receive a user-drawn boundary instead of a
//! file-derived one. The drawing collaborator (a browser map, in practice)
//! lives outside this crate; here it is modelled as an abstract capability
//! backed by a single-slot synchronous channel: the producer enqueues at
//! most one pending polygon, the consumer blocks until it arrives, and the
//! slot is free again after consumption. The core never depends on HTTP or
//! browser specifics.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use geo::{Coord, LineString, Polygon};
use tracing::debug;

use crate::error::{PlanningError, Result};

/// A source of user-provided boundary polygons
///
/// One invocation yields at most one polygon; `None` means the user
/// submitted nothing.
pub trait BoundarySource {
    /// Block until the user submits a boundary (or explicitly nothing)
    ///
    /// `context` is a free-form prompt for the collaborator's UI; it never
    /// affects the returned geometry.
    fn request_polygon(&mut self, context: &str) -> Result<Option<Polygon<f64>>>;
}

/// Create a connected submitter/receiver pair
///
/// The channel holds at most one pending submission at a time.
pub fn boundary_channel() -> (BoundarySubmitter, BoundaryReceiver) {
    let (tx, rx) = sync_channel(1);
    (BoundarySubmitter { tx }, BoundaryReceiver { rx })
}

/// Producer half: the drawing collaborator submits here
#[derive(Clone)]
pub struct BoundarySubmitter {
    tx: SyncSender<Option<Polygon<f64>>>,
}

impl BoundarySubmitter {
    /// Submit an already-parsed polygon (or `None` for an empty submission)
    ///
    /// Blocks while a previous submission is still unconsumed, keeping the
    /// channel single-slot.
    ///
    /// # Errors
    ///
    /// Returns `Input` when the consumer side has gone away.
    pub fn submit(&self, polygon: Option<Polygon<f64>>) -> Result<()> {
        self.tx.send(polygon).map_err(|_| {
            PlanningError::Input("boundary consumer is no longer listening".to_string())
        })
    }

    /// Parse a polygon-bearing GeoJSON-like payload and submit the result
    ///
    /// Accepts a FeatureCollection (first polygon-bearing feature wins), a
    /// single Feature, or a bare Polygon/MultiPolygon geometry. An empty
    /// submission parses to `None`.
    pub fn submit_geojson(&self, payload: &str) -> Result<()> {
        self.submit(parse_polygon(payload)?)
    }
}

/// Consumer half: the grid workflow requests boundaries here
pub struct BoundaryReceiver {
    rx: Receiver<Option<Polygon<f64>>>,
}

impl BoundarySource for BoundaryReceiver {
    fn request_polygon(&mut self, context: &str) -> Result<Option<Polygon<f64>>> {
        debug!(context, "waiting for a drawn boundary");
        self.rx.recv().map_err(|_| {
            PlanningError::Input("boundary producer went away before submitting".to_string())
        })
    }
}

/// Extract the first polygon from a GeoJSON-like payload
///
/// Returns `Ok(None)` when the payload is well-formed but carries no
/// polygon (nothing drawn, or only non-polygon geometries).
///
/// # Errors
///
/// Returns `Input` for payloads that are not valid JSON or carry malformed
/// coordinates.
pub fn parse_polygon(payload: &str) -> Result<Option<Polygon<f64>>> {
    let value: serde_json::Value = serde_json::from_str(payload).map_err(|e| {
        PlanningError::Input(format!("boundary payload is not valid JSON: {}", e))
    })?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            PlanningError::Input("boundary payload has no \"type\" member".to_string())
        })?;

    match kind {
        "FeatureCollection" => {
            let Some(features) = value.get("features").and_then(|f| f.as_array()) else {
                return Ok(None);
            };
            for feature in features {
                if let Some(geometry) = feature.get("geometry") {
                    if let Some(polygon) = polygon_from_geometry(geometry)? {
                        return Ok(Some(polygon));
                    }
                }
            }
            Ok(None)
        }
        "Feature" => match value.get("geometry") {
            Some(geometry) => polygon_from_geometry(geometry),
            None => Ok(None),
        },
        _ => polygon_from_geometry(&value),
    }
}

fn polygon_from_geometry(geometry: &serde_json::Value) -> Result<Option<Polygon<f64>>> {
    match geometry.get("type").and_then(|t| t.as_str()) {
        Some("Polygon") => {
            let rings: Vec<Vec<Vec<f64>>> = coordinates_of(geometry)?;
            Ok(Some(polygon_from_rings(&rings)?))
        }
        Some("MultiPolygon") => {
            let polygons: Vec<Vec<Vec<Vec<f64>>>> = coordinates_of(geometry)?;
            match polygons.first() {
                Some(rings) => Ok(Some(polygon_from_rings(rings)?)),
                None => Ok(None),
            }
        }
        // points, lines and unknown geometries carry no boundary
        _ => Ok(None),
    }
}

fn coordinates_of<T: serde::de::DeserializeOwned>(geometry: &serde_json::Value) -> Result<T> {
    let coordinates = geometry.get("coordinates").ok_or_else(|| {
        PlanningError::Input("polygon geometry has no coordinates".to_string())
    })?;
    serde_json::from_value(coordinates.clone()).map_err(|e| {
        PlanningError::Input(format!("malformed polygon coordinates: {}", e))
    })
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut iter = rings.iter();
    let exterior = iter
        .next()
        .ok_or_else(|| PlanningError::Input("polygon has no rings".to_string()))?;
    let interiors = iter
        .map(|ring| ring_from_positions(ring))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring_from_positions(exterior)?, interiors))
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    let mut coords = Vec::with_capacity(positions.len());
    for position in positions {
        if position.len() < 2 {
            return Err(PlanningError::Input(
                "polygon position has fewer than two coordinates".to_string(),
            ));
        }
        coords.push(Coord {
            x: position[0],
            y: position[1],
        });
    }
    Ok(LineString::from(coords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const DRAWN: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]]]
            }
        }]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let polygon = parse_polygon(DRAWN).unwrap().unwrap();
        assert_eq!(polygon.exterior().0.len(), 5);
        assert_eq!(polygon.exterior().0[1], Coord { x: 4.0, y: 0.0 });
    }

    #[test]
    fn test_parse_bare_polygon() {
        let payload = r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}"#;
        assert!(parse_polygon(payload).unwrap().is_some());
    }

    #[test]
    fn test_parse_feature_wrapper() {
        let payload = r#"{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}
        }"#;
        assert!(parse_polygon(payload).unwrap().is_some());
    }

    #[test]
    fn test_empty_submission_is_none() {
        let payload = r#"{"type": "FeatureCollection", "features": []}"#;
        assert_eq!(parse_polygon(payload).unwrap(), None);
    }

    #[test]
    fn test_non_polygon_geometries_are_none() {
        let payload = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
            }]
        }"#;
        assert_eq!(parse_polygon(payload).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload_is_input_error() {
        assert!(parse_polygon("not json").is_err());
        assert!(parse_polygon(r#"{"no": "type"}"#).is_err());
        let bad_coords = r#"{"type": "Polygon", "coordinates": [[[1.0]]]}"#;
        assert!(parse_polygon(bad_coords).is_err());
    }

    #[test]
    fn test_channel_delivers_one_polygon_per_request() {
        let (submitter, mut receiver) = boundary_channel();

        let producer = thread::spawn(move || {
            submitter.submit_geojson(DRAWN).unwrap();
            submitter.submit(None).unwrap();
        });

        let first = receiver.request_polygon("draw the study area").unwrap();
        assert!(first.is_some());

        // slot is immediately ready for the next request
        let second = receiver.request_polygon("draw another").unwrap();
        assert!(second.is_none());

        producer.join().unwrap();
    }

    #[test]
    fn test_disconnected_producer_is_input_error() {
        let (submitter, mut receiver) = boundary_channel();
        drop(submitter);
        assert!(receiver.request_polygon("anything").is_err());
    }
}
