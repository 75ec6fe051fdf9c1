// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::stripe::StripeTracker;
use crate::{range_tombstone::RangeTombstone, SeqNo, UserKey};
use std::collections::BTreeMap;

/// A fragmented range tombstone, non-overlapping with its siblings on the
/// user-key axis.
pub type Fragment = RangeTombstone;

/// Splits overlapping range tombstones into disjoint fragments on the
/// user-key axis, preserving per-fragment sequence numbers, grouped by
/// snapshot stripe.
///
/// Driven by [`crate::compaction::CompactionIterator`]; the algorithm is a
/// pluggable collaborator (downstream crates may back it with an on-disk
/// run), but [`SweepFragmenter`] ships a correct in-memory default so the
/// driver is exercisable standalone.
pub trait RangeDeleteFragmenter {
    /// Adds a range tombstone `[start, end)` at `seqno`.
    fn add(&mut self, start: UserKey, end: UserKey, seqno: SeqNo);

    /// Emits fragments whose start key is `< user_key`, retaining the rest
    /// for a later call.
    fn flush_to(&mut self, user_key: &[u8]) -> Vec<Fragment>;

    /// Emits all remaining fragments.
    fn finish(&mut self) -> Vec<Fragment>;
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    End,
    Start,
}

struct Event {
    key: UserKey,
    kind: EventKind,
    stripe: usize,
    seqno: SeqNo,
}

/// Default [`RangeDeleteFragmenter`], grounded on the sweep-line multiset
/// technique of `ActiveTombstoneSet` (seqno counts in a `BTreeMap`, swept
/// across sorted boundary events), adapted from "is this key suppressed"
/// queries to "emit disjoint fragments, newest-per-stripe."
///
/// Fragments from different stripes never compete with one another even
/// when their user-key ranges overlap — only tombstones within the *same*
/// stripe are collapsed down to their highest sequence number.
pub struct SweepFragmenter {
    snapshots: Vec<SeqNo>,
    pending: Vec<RangeTombstone>,
}

impl SweepFragmenter {
    /// Creates a fragmenter grouping by stripes of `snapshots` (sorted ascending).
    #[must_use]
    pub fn new(snapshots: Vec<SeqNo>) -> Self {
        Self {
            snapshots,
            pending: Vec::new(),
        }
    }

    fn stripe_of(&self, seqno: SeqNo) -> usize {
        StripeTracker::new(&self.snapshots).stripe_of(seqno)
    }

    /// Computes the full elementary-interval overlay over all pending
    /// tombstones: boundary points from every tombstone's start/end are
    /// swept left to right, and for each elementary interval, each stripe
    /// present contributes one fragment at its highest active seqno.
    fn sweep(&self) -> Vec<Fragment> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(self.pending.len() * 2);
        for t in &self.pending {
            let stripe = self.stripe_of(t.seqno);
            events.push(Event {
                key: t.start.clone(),
                kind: EventKind::Start,
                stripe,
                seqno: t.seqno,
            });
            events.push(Event {
                key: t.end.clone(),
                kind: EventKind::End,
                stripe,
                seqno: t.seqno,
            });
        }
        events.sort_by(|a, b| a.key.as_ref().cmp(b.key.as_ref()).then(a.kind.cmp(&b.kind)));

        let mut active: BTreeMap<usize, BTreeMap<SeqNo, u32>> = BTreeMap::new();
        let mut fragments = Vec::new();
        let mut prev_key: Option<UserKey> = None;

        for event in events {
            if let Some(prev) = &prev_key {
                if prev.as_ref() < event.key.as_ref() && !active.is_empty() {
                    for (_stripe, seqnos) in &active {
                        if let Some((&max_seqno, _)) = seqnos.iter().next_back() {
                            fragments.push(Fragment::new(
                                prev.clone(),
                                event.key.clone(),
                                max_seqno,
                            ));
                        }
                    }
                }
            }

            match event.kind {
                EventKind::Start => {
                    *active
                        .entry(event.stripe)
                        .or_default()
                        .entry(event.seqno)
                        .or_insert(0) += 1;
                }
                EventKind::End => {
                    if let Some(seqnos) = active.get_mut(&event.stripe) {
                        if let Some(count) = seqnos.get_mut(&event.seqno) {
                            *count -= 1;
                            if *count == 0 {
                                seqnos.remove(&event.seqno);
                            }
                        }
                        if seqnos.is_empty() {
                            active.remove(&event.stripe);
                        }
                    }
                }
            }

            prev_key = Some(event.key);
        }

        fragments
    }
}

impl RangeDeleteFragmenter for SweepFragmenter {
    fn add(&mut self, start: UserKey, end: UserKey, seqno: SeqNo) {
        log::trace!("fragmenter: add [{start:?}, {end:?}) #{seqno}");
        self.pending.push(RangeTombstone::new(start, end, seqno));
    }

    fn flush_to(&mut self, user_key: &[u8]) -> Vec<Fragment> {
        let all = self.sweep();

        let mut ready = Vec::with_capacity(all.len());
        for f in all {
            if f.start.as_ref() >= user_key {
                continue;
            }
            if f.end.as_ref() <= user_key {
                ready.push(f);
            } else {
                // Straddles the frontier: only the part before it has
                // settled (no future `add` can still affect it).
                ready.push(Fragment::new(f.start, UserKey::from(user_key), f.seqno));
            }
        }

        // Clip each pending tombstone at the frontier so the next sweep
        // only ever regenerates the unsettled remainder, never the part
        // already handed out above.
        let frontier = UserKey::from(user_key);
        self.pending = self
            .pending
            .drain(..)
            .filter_map(|t| {
                if t.end.as_ref() <= frontier.as_ref() {
                    None
                } else if t.start.as_ref() < frontier.as_ref() {
                    Some(RangeTombstone::new(frontier.clone(), t.end, t.seqno))
                } else {
                    Some(t)
                }
            })
            .collect();

        ready
    }

    fn finish(&mut self) -> Vec<Fragment> {
        let all = self.sweep();
        self.pending.clear();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn frag(start: &[u8], end: &[u8], seqno: SeqNo) -> Fragment {
        Fragment::new(UserKey::from(start), UserKey::from(end), seqno)
    }

    #[test]
    fn single_tombstone_is_unfragmented() {
        let mut f = SweepFragmenter::new(vec![]);
        f.add(UserKey::from(b"a" as &[u8]), UserKey::from(b"z" as &[u8]), 1);
        assert_eq!(f.finish(), vec![frag(b"a", b"z", 1)]);
    }

    // Scenario 5 from spec: overlapping tombstones in a single stripe keep
    // only the highest seqno for their overlapping sub-range.
    #[test]
    fn overlapping_single_stripe_keeps_newest() {
        let mut f = SweepFragmenter::new(vec![]);
        f.add(UserKey::from(b"a" as &[u8]), UserKey::from(b"e" as &[u8]), 1);
        f.add(UserKey::from(b"c" as &[u8]), UserKey::from(b"g" as &[u8]), 2);

        let mut fragments = f.finish();
        fragments.sort_by(|a, b| a.start.as_ref().cmp(b.start.as_ref()));

        assert_eq!(
            fragments,
            vec![frag(b"a", b"c", 1), frag(b"c", b"e", 2), frag(b"e", b"g", 2)]
        );
    }

    // Scenario 6: same fragments, but across two stripes — overlapping
    // sub-ranges from different stripes don't compete.
    #[test]
    fn overlapping_across_stripes_both_retained() {
        let mut f = SweepFragmenter::new(vec![2]);
        f.add(UserKey::from(b"a" as &[u8]), UserKey::from(b"e" as &[u8]), 1);
        f.add(UserKey::from(b"c" as &[u8]), UserKey::from(b"g" as &[u8]), 2);

        let mut fragments = f.finish();
        fragments.sort_by(|a, b| {
            a.start
                .as_ref()
                .cmp(b.start.as_ref())
                .then(a.seqno.cmp(&b.seqno))
        });

        assert_eq!(
            fragments,
            vec![
                frag(b"a", b"c", 1),
                frag(b"c", b"e", 1),
                frag(b"c", b"e", 2),
                frag(b"e", b"g", 2),
            ]
        );
    }

    #[test]
    fn flush_to_only_emits_settled_fragments() {
        let mut f = SweepFragmenter::new(vec![]);
        f.add(UserKey::from(b"a" as &[u8]), UserKey::from(b"m" as &[u8]), 1);
        f.add(UserKey::from(b"p" as &[u8]), UserKey::from(b"z" as &[u8]), 2);

        let ready = f.flush_to(b"n");
        assert_eq!(ready, vec![frag(b"a", b"m", 1)]);

        let rest = f.finish();
        assert_eq!(rest, vec![frag(b"p", b"z", 2)]);
    }

    #[test]
    fn no_pending_tombstones_yields_no_fragments() {
        let mut f = SweepFragmenter::new(vec![]);
        assert!(f.finish().is_empty());
    }

    // A single tombstone straddling a flush boundary must be emitted once
    // in total, split at the boundary, never handed out twice.
    #[test]
    fn straddling_tombstone_is_not_duplicated_by_finish() {
        let mut f = SweepFragmenter::new(vec![]);
        f.add(UserKey::from(b"a" as &[u8]), UserKey::from(b"z" as &[u8]), 1);

        let ready = f.flush_to(b"n");
        assert_eq!(ready, vec![frag(b"a", b"n", 1)]);

        let rest = f.finish();
        assert_eq!(rest, vec![frag(b"n", b"z", 1)]);
    }
}
