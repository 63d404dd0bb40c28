//! Example: Generate a planning-unit grid
//!
//! Demonstrates configuration, tiling and clipping to a drawn boundary.

use geo::{Area, Rect};
use hexgrid_planner::*;

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    println!("Planning-Unit Grid Generation Example");
    println!("=====================================\n");

    let config = SessionConfigBuilder::new()
        .target_crs("EPSG:3857")
        .expect("valid CRS")
        .cell_area_text("25 ha")
        .expect("valid cell area")
        .verbose(true)
        .build()
        .expect("valid configuration");

    println!("Configuration:");
    println!("  Target CRS: {}", config.target_crs);
    println!("  Cell Area: {} m²", config.cell_area);
    println!("  Workers: {}", config.workers);
    println!();

    let bounds = Rect::new(
        geo::coord! { x: 0.0, y: 0.0 },
        geo::coord! { x: 10_000.0, y: 8_000.0 },
    );

    println!("Tiling a {} x {} m extent...", bounds.width(), bounds.height());
    let grid = Grid::generate("demo-grid", bounds, &config).expect("grid generation");
    println!("Generated {} planning units\n", grid.unit_count());

    // Clip to a boundary as if drawn on the interactive map
    let payload = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [1000.0, 1000.0], [9000.0, 2000.0], [7000.0, 7000.0],
                    [2000.0, 6000.0], [1000.0, 1000.0]
                ]]
            }
        }]
    }"#;

    let (submitter, mut receiver) = boundary_channel();
    submitter.submit_geojson(payload).expect("valid payload");
    let boundary = receiver
        .request_polygon("draw the study area")
        .expect("boundary exchange")
        .expect("a polygon was drawn");

    let clipped = grid.clip_to_boundary(&boundary);
    println!(
        "Clipped to drawn boundary: {} of {} units remain",
        clipped.unit_count(),
        grid.unit_count()
    );

    // Sample cells
    println!("\nSample planning units:");
    for unit in clipped.units().iter().take(5) {
        println!(
            "  Unit {}: center=({:.1}, {:.1}), area={:.1} m²",
            unit.puid,
            unit.center.x,
            unit.center.y,
            unit.geometry.unsigned_area()
        );
    }

    println!("\nGeneration complete!");
}
