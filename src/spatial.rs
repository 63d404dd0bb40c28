//! Spatial indexing for fast position-to-unit lookups
//!
//! This module is only available with the `spatial-index` feature.

#[cfg(feature = "spatial-index")]
use glam::DVec2;
#[cfg(feature = "spatial-index")]
use kiddo::immutable::float::kdtree::ImmutableKdTree;
#[cfg(feature = "spatial-index")]
use kiddo::SquaredEuclidean;

/// Wrapper around a KD-tree of planning-unit centers
///
/// Provides O(log n) nearest-center lookups to convert map positions into
/// planning-unit indices, used for interactive unit selection.
///
/// On a hexagonal tiling the nearest center is the containing cell, so a
/// single nearest-neighbour query plus one exact containment check answers
/// point-in-unit queries.
#[cfg(feature = "spatial-index")]
#[derive(Clone)]
pub struct SpatialIndex {
    tree: ImmutableKdTree<f64, usize, 2, 32>,
}

#[cfg(feature = "spatial-index")]
impl SpatialIndex {
    /// Build a spatial index from unit centers
    ///
    /// Called once per grid construction; the input order defines the
    /// indices returned by [`SpatialIndex::find_nearest`].
    ///
    /// # Example
    ///
    /// ```
    /// use hexgrid_planner::SpatialIndex;
    /// use glam::DVec2;
    ///
    /// let centers = vec![
    ///     DVec2::new(0.0, 0.0),
    ///     DVec2::new(10.0, 0.0),
    ///     DVec2::new(0.0, 10.0),
    /// ];
    ///
    /// let index = SpatialIndex::new(&centers);
    /// assert_eq!(index.find_nearest(DVec2::new(9.0, 1.0)), 1);
    /// ```
    pub fn new(centers: &[DVec2]) -> Self {
        let points: Vec<[f64; 2]> = centers.iter().map(|c| [c.x, c.y]).collect();

        Self {
            tree: ImmutableKdTree::new_from_slice(&points),
        }
    }

    /// Find the index of the nearest unit center to a position
    pub fn find_nearest(&self, position: DVec2) -> usize {
        let query = [position.x, position.y];
        let result = self.tree.nearest_one::<SquaredEuclidean>(&query);
        result.item as usize
    }
}

#[cfg(test)]
#[cfg(feature = "spatial-index")]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_index_basic() {
        let centers = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(100.0, 0.0),
            DVec2::new(0.0, 100.0),
            DVec2::new(-100.0, -100.0),
        ];

        let index = SpatialIndex::new(&centers);

        assert_eq!(index.find_nearest(DVec2::new(5.0, -5.0)), 0);
        assert_eq!(index.find_nearest(DVec2::new(90.0, 10.0)), 1);
        assert_eq!(index.find_nearest(DVec2::new(10.0, 95.0)), 2);
        assert_eq!(index.find_nearest(DVec2::new(-80.0, -90.0)), 3);
    }

    #[test]
    fn test_spatial_index_exact_match() {
        let centers = vec![DVec2::new(3.0, 4.0), DVec2::new(-7.0, 2.0)];

        let index = SpatialIndex::new(&centers);

        assert_eq!(index.find_nearest(centers[0]), 0);
        assert_eq!(index.find_nearest(centers[1]), 1);
    }
}
