//! Example: Full overlap run
//!
//! Builds a grid, synthesizes two conservation layers, computes the overlap
//! table in parallel and renders it as CSV on stdout.

use geo::{polygon, Rect};
use hexgrid_planner::*;

fn habitat_layer() -> ConservationLayer {
    let mut layer = ConservationLayer::new("habitats", Some("EPSG:3857"));
    layer.features = vec![
        Feature::new(polygon![
            (x: 500.0, y: 500.0),
            (x: 2_500.0, y: 700.0),
            (x: 2_200.0, y: 2_400.0),
            (x: 600.0, y: 2_000.0),
        ])
        .with_attribute("ID", 101)
        .with_attribute("CLASS_TYPE", "wetland"),
        Feature::new(polygon![
            (x: 3_000.0, y: 3_000.0),
            (x: 4_500.0, y: 3_200.0),
            (x: 4_000.0, y: 4_500.0),
        ])
        .with_attribute("ID", 102)
        .with_attribute("CLASS_TYPE", "forest"),
    ];
    layer
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let config = SessionConfigBuilder::new()
        .target_crs("EPSG:3857")
        .expect("valid CRS")
        .cell_area_text("10 ha")
        .expect("valid cell area")
        .workers(4)
        .expect("valid worker count")
        .verbose(true)
        .build()
        .expect("valid configuration");

    let bounds = Rect::new(
        geo::coord! { x: 0.0, y: 0.0 },
        geo::coord! { x: 5_000.0, y: 5_000.0 },
    );
    let grid = Grid::generate("overlap-demo", bounds, &config).expect("grid generation");
    eprintln!("Grid: {} planning units", grid.unit_count());

    // Filter the loaded layers down to a working subset, then align CRS
    let loaded = vec![habitat_layer(), ConservationLayer::new("empty", Some("EPSG:3857"))];
    let filter = LayerFilter::new(
        FilterField::Class,
        vec![AttrValue::from("wetland"), AttrValue::from("forest")],
    );
    let working = filter.apply(&loaded, &config.keys);
    let layers: Vec<ConservationLayer> = working
        .iter()
        .map(|layer| crs::project(layer, grid.crs()))
        .collect::<Result<_>>()
        .expect("projection");

    let engine = OverlapEngine::from_config(&config).expect("engine");
    let report = engine.run(&grid, &layers);

    eprintln!(
        "Overlap: {} records, {} diagnostics",
        report.table.len(),
        report.diagnostics.len()
    );
    for diagnostic in &report.diagnostics {
        eprintln!("  [{:?}] {}", diagnostic.kind, diagnostic.message);
    }

    write_csv(&report.table, &config.columns, std::io::stdout()).expect("export");
}
