// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::SeqNo;

/// Maps sequence numbers to snapshot stripes.
///
/// Snapshots partition the sequence axis into stripes: an entry with
/// sequence `q` lies in stripe `i`, the smallest index with `sᵢ > q`. The
/// lowest stripe is `0`; the top stripe is unbounded above.
pub(crate) struct StripeTracker<'a> {
    snapshots: &'a [SeqNo],
}

impl<'a> StripeTracker<'a> {
    pub fn new(snapshots: &'a [SeqNo]) -> Self {
        debug_assert!(
            snapshots.windows(2).all(|w| w[0] < w[1]),
            "snapshot list must be sorted ascending and deduplicated"
        );
        Self { snapshots }
    }

    /// Returns the stripe index containing `seqno`.
    ///
    /// Stripe `i` is the smallest index with `sᵢ > seqno`; equivalently, the
    /// count of snapshots `<= seqno`. An entry with `seqno == sᵢ` is *not*
    /// covered by that snapshot (no snapshot read at `sᵢ` can see a write at
    /// the same seqno as a later one), so it falls in the same stripe as
    /// entries with slightly *larger* sequence numbers, not smaller ones —
    /// the stripe boundary is strictly greater-than.
    pub fn stripe_of(&self, seqno: SeqNo) -> usize {
        self.snapshots.partition_point(|&s| s <= seqno)
    }

    /// Returns `curSnapshotSeqNum` for `stripe`: the snapshot that bounds it
    /// from above, or `SeqNo::MAX` (the sentinel `InternalKeySeqNumMax`) for
    /// the top, unbounded stripe.
    pub fn upper_bound(&self, stripe: usize) -> SeqNo {
        self.snapshots.get(stripe).copied().unwrap_or(SeqNo::MAX)
    }

    pub fn is_lowest(stripe: usize) -> bool {
        stripe == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn empty_snapshot_list_is_one_stripe() {
        let tracker = StripeTracker::new(&[]);
        assert_eq!(tracker.stripe_of(0), 0);
        assert_eq!(tracker.stripe_of(u64::MAX), 0);
        assert_eq!(tracker.upper_bound(0), SeqNo::MAX);
    }

    #[test]
    fn seqno_below_first_snapshot_is_stripe_zero() {
        let tracker = StripeTracker::new(&[7]);
        assert_eq!(tracker.stripe_of(5), 0);
        assert_eq!(tracker.upper_bound(0), 7);
    }

    #[test]
    fn seqno_equal_to_snapshot_joins_the_stripe_above() {
        let tracker = StripeTracker::new(&[7]);
        assert_eq!(
            tracker.stripe_of(7),
            1,
            "seq == snapshot is not covered by it, so it joins the stripe above"
        );
        assert_eq!(tracker.stripe_of(8), 1);
        assert_eq!(tracker.stripe_of(6), 0);
    }

    #[test]
    fn top_stripe_is_unbounded() {
        let tracker = StripeTracker::new(&[2, 7]);
        assert_eq!(tracker.stripe_of(100), 2);
        assert_eq!(tracker.upper_bound(2), SeqNo::MAX);
    }

    #[test]
    fn multiple_snapshots_partition_correctly() {
        let tracker = StripeTracker::new(&[2, 7, 20]);
        assert_eq!(tracker.stripe_of(1), 0);
        assert_eq!(tracker.stripe_of(2), 1);
        assert_eq!(tracker.stripe_of(3), 1);
        assert_eq!(tracker.stripe_of(7), 2);
        assert_eq!(tracker.stripe_of(8), 2);
        assert_eq!(tracker.stripe_of(20), 3);
        assert_eq!(tracker.stripe_of(21), 3);
    }

    #[test]
    fn is_lowest() {
        assert!(StripeTracker::is_lowest(0));
        assert!(!StripeTracker::is_lowest(1));
    }
}
