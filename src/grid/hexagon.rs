//! Hexagon tiling math
//!
//! Equal-area, flat-top hexagons laid out in a brick pattern: columns are
//! spaced `1.5·edge` apart, rows `√3·edge`, with every odd column shifted by
//! half a row step so neighbouring cells share edges. The tiling is anchored
//! to a global origin derived from the step sizes, not to the bounding box,
//! so grids built with the same cell area over different extents line up
//! exactly where they overlap.

use geo::{Coord, LineString, Polygon, Rect};
use glam::DVec2;

/// Edge length of a hexagon with the given area
///
/// Inverts `area = (3·√3 / 2) · edge²`.
#[inline]
pub fn edge_length(cell_area: f64) -> f64 {
    (cell_area / (1.5 * 3.0_f64.sqrt())).sqrt()
}

/// Area of a hexagon with the given edge length
#[inline]
pub fn hexagon_area(edge_length: f64) -> f64 {
    1.5 * 3.0_f64.sqrt() * edge_length * edge_length
}

/// Build one flat-top hexagon around a center point
///
/// Six vertices at 60° increments from angle zero, each at `edge_length`
/// from the center. The starting angle is fixed so that every cell in a grid
/// uses the same orientation and adjacent cells tile without gaps.
pub fn make_hexagon(edge_length: f64, center: DVec2) -> Polygon<f64> {
    let mut coords = Vec::with_capacity(7);
    for k in 0..6 {
        let angle = std::f64::consts::FRAC_PI_3 * k as f64;
        coords.push(Coord {
            x: center.x + edge_length * angle.cos(),
            y: center.y + edge_length * angle.sin(),
        });
    }
    coords.push(coords[0]);
    Polygon::new(LineString::from(coords), vec![])
}

/// Enumerate hexagon centers covering a bounding box
///
/// Returns the centers in column-major order (all of column *i*, ascending
/// y, before column *i+1*) together with the computed edge length. The
/// caller assigns planning-unit ids from this enumeration order.
///
/// Centers extend one step beyond the box on every side so clipped
/// boundaries are fully covered. A degenerate box (zero width or height)
/// yields an empty list, not an error.
pub fn hex_centers(bbox: Rect<f64>, cell_area: f64) -> (Vec<DVec2>, f64) {
    let edge = edge_length(cell_area);
    let step_x = 1.5 * edge;
    let step_y = 3.0_f64.sqrt() * edge;

    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return (Vec::new(), edge);
    }

    // Anchor to the global lattice so overlapping extents produce aligned
    // cells: columns and rows are indexed on the whole plane, and the
    // half-step offset follows the global column parity.
    let first_column = (bbox.min().x / step_x).floor() as i64 - 1;
    let first_row = (bbox.min().y / step_y).floor() as i64 - 1;

    let mut centers = Vec::new();
    let mut column = first_column;
    loop {
        let x = column as f64 * step_x;
        if x > bbox.max().x + step_x {
            break;
        }
        let offset = if column.rem_euclid(2) == 1 {
            step_y / 2.0
        } else {
            0.0
        };
        let mut row = first_row;
        loop {
            let y = row as f64 * step_y + offset;
            if y > bbox.max().y + step_y {
                break;
            }
            centers.push(DVec2::new(x, y));
            row += 1;
        }
        column += 1;
    }

    (centers, edge)
}
