//! Sparse overlap tables
//!
//! A record exists only for (planning unit, feature) pairs with a non-zero
//! overlap area. Tables are always held in canonical ascending
//! `(puid, feature_id)` order so merged parallel results are deterministic.

use serde::{Deserialize, Serialize};

use crate::layer::AttrValue;

/// One planning-unit × feature overlap amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionRecord {
    /// Planning-unit identifier
    pub puid: u32,
    /// Feature identifier taken from the layer's id attribute
    pub feature_id: AttrValue,
    /// Overlap area in squared CRS units, rounded to the nearest integer
    ///
    /// Always positive: zero-overlap pairs are never materialized.
    pub amount: u64,
}

/// An ordered sequence of intersection records
///
/// Construction sorts into canonical order, so equality between two tables
/// means identical rows in identical order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntersectionTable {
    records: Vec<IntersectionRecord>,
}

impl IntersectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records, sorting into canonical order
    pub fn from_records(mut records: Vec<IntersectionRecord>) -> Self {
        sort_canonical(&mut records);
        Self { records }
    }

    /// Concatenate tables and re-sort into canonical order
    ///
    /// Idempotent: aggregating a single already-canonical table returns an
    /// equal table.
    pub fn aggregate(tables: impl IntoIterator<Item = IntersectionTable>) -> Self {
        let records: Vec<IntersectionRecord> = tables
            .into_iter()
            .flat_map(|table| table.records)
            .collect();
        Self::from_records(records)
    }

    /// Records in canonical order
    #[inline]
    pub fn records(&self) -> &[IntersectionRecord] {
        &self.records
    }

    /// Number of records
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in canonical order
    pub fn iter(&self) -> std::slice::Iter<'_, IntersectionRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a IntersectionTable {
    type Item = &'a IntersectionRecord;
    type IntoIter = std::slice::Iter<'a, IntersectionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn sort_canonical(records: &mut [IntersectionRecord]) {
    records.sort_by(|a, b| {
        (a.puid, &a.feature_id).cmp(&(b.puid, &b.feature_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(puid: u32, feature_id: impl Into<AttrValue>, amount: u64) -> IntersectionRecord {
        IntersectionRecord {
            puid,
            feature_id: feature_id.into(),
            amount,
        }
    }

    #[test]
    fn test_from_records_sorts_canonically() {
        let table = IntersectionTable::from_records(vec![
            record(2, 1, 40),
            record(1, "b", 30),
            record(1, 5, 20),
            record(1, 2, 10),
        ]);

        let order: Vec<(u32, AttrValue)> = table
            .iter()
            .map(|r| (r.puid, r.feature_id.clone()))
            .collect();

        assert_eq!(
            order,
            vec![
                (1, AttrValue::Int(2)),
                (1, AttrValue::Int(5)),
                (1, AttrValue::from("b")),
                (2, AttrValue::Int(1)),
            ]
        );
    }

    #[test]
    fn test_aggregate_concatenates_and_sorts() {
        let first = IntersectionTable::from_records(vec![record(3, 1, 5), record(1, 1, 7)]);
        let second = IntersectionTable::from_records(vec![record(2, 1, 9)]);

        let merged = IntersectionTable::aggregate([first, second]);

        let puids: Vec<u32> = merged.iter().map(|r| r.puid).collect();
        assert_eq!(puids, vec![1, 2, 3]);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let table = IntersectionTable::from_records(vec![record(1, 1, 5), record(2, 2, 6)]);
        let again = IntersectionTable::aggregate([table.clone()]);
        assert_eq!(table, again);
    }

    #[test]
    fn test_empty_table() {
        let table = IntersectionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(IntersectionTable::aggregate([]), table);
    }
}
