//! Tabular rendering of overlap tables
//!
//! One data row per intersection record under a fixed three-column header,
//! in canonical table order, consumable by the downstream optimization tool.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};
use crate::layer::AttrValue;
use crate::table::IntersectionTable;

/// Column names for the exported table
///
/// The literals are configurable; the semantics are fixed as
/// "species id", "planning unit id", "overlap amount".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportColumns {
    /// Header for the feature (species) identifier column
    pub species: String,
    /// Header for the planning-unit identifier column
    pub pu: String,
    /// Header for the overlap amount column
    pub amount: String,
}

impl Default for ExportColumns {
    fn default() -> Self {
        Self {
            species: "species".to_string(),
            pu: "pu".to_string(),
            amount: "amount".to_string(),
        }
    }
}

/// Render a table as `(feature_id, puid, amount)` rows in canonical order
///
/// Records with a non-positive amount cannot exist by construction, but the
/// boundary filters them defensively anyway so an upstream bug can never
/// leak zero rows into the export.
pub fn to_tabular(table: &IntersectionTable) -> Vec<(AttrValue, u32, u64)> {
    table
        .iter()
        .filter(|record| record.amount > 0)
        .map(|record| (record.feature_id.clone(), record.puid, record.amount))
        .collect()
}

/// Write a table as CSV to any writer
///
/// Header row first, then one row per record in canonical order, amounts as
/// plain integers, no index column.
///
/// # Errors
///
/// Returns `Input` when the underlying writer fails.
///
/// # Example
///
/// ```rust
/// use hexgrid_planner::*;
///
/// let table = IntersectionTable::from_records(vec![IntersectionRecord {
///     puid: 1,
///     feature_id: AttrValue::from("A"),
///     amount: 500,
/// }]);
///
/// let mut out = Vec::new();
/// write_csv(&table, &ExportColumns::default(), &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "species,pu,amount\nA,1,500\n");
/// ```
pub fn write_csv<W: Write>(
    table: &IntersectionTable,
    columns: &ExportColumns,
    writer: W,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([&columns.species, &columns.pu, &columns.amount])
        .map_err(csv_error)?;

    for (feature_id, puid, amount) in to_tabular(table) {
        csv_writer
            .write_record([
                feature_id.to_string(),
                puid.to_string(),
                amount.to_string(),
            ])
            .map_err(csv_error)?;
    }

    csv_writer.flush().map_err(|e| {
        PlanningError::Input(format!("cannot flush overlap export: {}", e))
    })
}

fn csv_error(error: csv::Error) -> PlanningError {
    PlanningError::Input(format!("cannot write overlap export: {}", error))
}
