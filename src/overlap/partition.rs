//! Grid partitioning for the parallel overlap computation
//!
//! Chunking is a pure function of the unit count and the chunk count, kept
//! separate from the engine so the partition stage can be tested on its own.

use std::ops::Range;

/// Split `0..len` into at most `chunks` contiguous, order-preserving ranges
///
/// Chunk sizes differ by at most one, with the longer chunks first.
/// Identical inputs always produce identical ranges, so every planning unit
/// is processed exactly once regardless of worker count.
///
/// # Example
///
/// ```
/// use hexgrid_planner::overlap::chunk_ranges;
///
/// assert_eq!(chunk_ranges(7, 3), vec![0..3, 3..5, 5..7]);
/// assert_eq!(chunk_ranges(2, 4), vec![0..1, 1..2]);
/// assert_eq!(chunk_ranges(0, 4), Vec::<std::ops::Range<usize>>::new());
/// ```
pub fn chunk_ranges(len: usize, chunks: usize) -> Vec<Range<usize>> {
    if len == 0 || chunks == 0 {
        return Vec::new();
    }

    let count = chunks.min(len);
    let base = len / count;
    let remainder = len % count;

    let mut ranges = Vec::with_capacity(count);
    let mut start = 0;
    for index in 0..count {
        let size = base + usize::from(index < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        assert_eq!(chunk_ranges(8, 4), vec![0..2, 2..4, 4..6, 6..8]);
    }

    #[test]
    fn test_uneven_split() {
        assert_eq!(chunk_ranges(10, 4), vec![0..3, 3..6, 6..8, 8..10]);
    }

    #[test]
    fn test_single_chunk() {
        assert_eq!(chunk_ranges(5, 1), vec![0..5]);
    }

    #[test]
    fn test_more_chunks_than_items() {
        assert_eq!(chunk_ranges(3, 8), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_ranges(0, 4).is_empty());
        assert!(chunk_ranges(4, 0).is_empty());
    }

    #[test]
    fn test_total_coverage_without_gaps() {
        for len in [1usize, 2, 5, 17, 100, 101] {
            for chunks in [1usize, 2, 3, 4, 7, 16] {
                let ranges = chunk_ranges(len, chunks);
                let mut expected_start = 0;
                for range in &ranges {
                    assert_eq!(range.start, expected_start);
                    assert!(range.end > range.start);
                    expected_start = range.end;
                }
                assert_eq!(expected_start, len, "len={} chunks={}", len, chunks);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(chunk_ranges(97, 6), chunk_ranges(97, 6));
    }
}
