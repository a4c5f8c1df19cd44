/// Splits the inclusive id range `[start, end]` into half-open batches of at most
/// `size` ids each, used by the Reconciler to throttle RPC load during snapshot
/// sync.
///
/// Invariant: the concatenated coverage of the returned batches equals
/// `[start, end + 1)` with no overlap, and at least one batch is always returned.
pub fn plan(start: u64, end: u64, size: u64) -> Vec<(u64, u64)> {
    if start == end {
        return vec![(start, start + 1)];
    }
    if end - start + 1 <= size {
        return vec![(start, end + 1)];
    }

    let mut batches = Vec::new();
    let mut i = start;
    while i <= end {
        let hi = (i + size - 1).min(end);
        batches.push((i, hi + 1));
        i += size;
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_id() {
        assert_eq!(plan(5, 5, 10), vec![(5, 6)]);
    }

    #[test]
    fn fits_in_one_batch() {
        assert_eq!(plan(1, 3, 10), vec![(1, 4)]);
    }

    #[test]
    fn splits_into_multiple_batches() {
        assert_eq!(plan(1, 250, 200), vec![(1, 201), (201, 251)]);
    }

    #[test]
    fn exact_multiple_of_batch_size() {
        assert_eq!(plan(1, 6, 3), vec![(1, 4), (4, 7)]);
    }

    #[test]
    fn coverage_has_no_gaps_or_overlap() {
        for size in [1u64, 2, 3, 7, 20] {
            let batches = plan(1, 47, size);
            assert!(!batches.is_empty());
            let mut expected_next = 1u64;
            for (lo, hi) in &batches {
                assert_eq!(*lo, expected_next);
                assert!(hi > lo);
                expected_next = *hi;
            }
            assert_eq!(expected_next, 48);
        }
    }
}
