// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    fragmenter::{Fragment, RangeDeleteFragmenter, SweepFragmenter},
    stripe::StripeTracker,
};
use crate::{
    key::Kind, range_tombstone::RangeTombstone, Error, InternalKey, InternalValue, SeqNo, UserKey,
    UserValue,
};
use std::{collections::VecDeque, iter::Peekable};

type Item = crate::Result<InternalValue>;

/// Total order on user-key bytes.
///
/// The default [`ByteComparator`] is plain lexicographic byte ordering,
/// matching the ordering [`crate::key::InternalKey`]'s own `Ord`
/// implementation already assumes for its `user_key` field. A pluggable
/// comparator is exposed only for parity with the external interface; the
/// iterator's internal bookkeeping (stripe membership, range-delete
/// coverage) is keyed by raw byte comparison either way.
pub trait Comparator {
    /// Compares two user keys.
    fn cmp(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering;
}

/// Plain lexicographic byte comparator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteComparator;

impl Comparator for ByteComparator {
    fn cmp(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }
}

/// Combines a newer and an older value for a [`Kind::Merge`] chain.
///
/// Folding is left-associative, newest to oldest: `merge(merge(v4, v3), v2)`.
/// Must never fail for well-formed inputs.
pub trait MergeOperator {
    /// Combines `newer` (folded so far) with `older` (the next operand back).
    fn merge(&self, user_key: &[u8], newer: &[u8], older: &[u8]) -> UserValue;
}

/// Decides whether a point tombstone can be dropped instead of emitted.
pub trait ElidePredicate {
    /// Returns `true` when no sstable at a deeper level contains `user_key`,
    /// so a `DELETE` at the lowest stripe can be safely dropped.
    fn elide(&self, user_key: &[u8]) -> bool;

    /// Optional hook for eliding a range tombstone outright. Defaults to
    /// `false`, which keeps output identical to a predicate that never
    /// implements it — the hook is an open extension point, not a mandated
    /// behavior (see `elide_range_hook_is_inert_by_default`).
    fn elide_range(&self, _start: &[u8], _end: &[u8]) -> bool {
        false
    }
}

/// Tracks range tombstones accumulated so far, for range-delete masking of
/// point entries.
///
/// Grounded on `ActiveTombstoneSet`'s activate/expire vocabulary, but
/// backed by a plain `Vec` rather than a heap-driven multiset: masking
/// queries here need an arbitrary, per-query stripe upper bound (the
/// current stripe's `curSnapshotSeqNum`), whereas the teacher's structure
/// is built around one fixed cutoff chosen at construction. The active set
/// in a single compaction is small (bounded by overlapping range tombstones
/// at one position), so a linear scan per query is not a concern.
struct ActiveRangeDeletes {
    active: Vec<RangeTombstone>,
}

impl ActiveRangeDeletes {
    fn new() -> Self {
        Self { active: Vec::new() }
    }

    fn activate(&mut self, rt: RangeTombstone) {
        self.active.push(rt);
    }

    /// Drops tombstones that can no longer cover any key `>= user_key`.
    fn expire_until(&mut self, user_key: &[u8]) {
        self.active.retain(|rt| rt.end.as_ref() > user_key);
    }

    /// Returns the highest seqno among active tombstones covering `user_key`
    /// with `seqno <= upper_bound`, or `None`.
    fn max_seqno_covering(&self, user_key: &[u8], upper_bound: SeqNo) -> Option<SeqNo> {
        self.active
            .iter()
            .filter(|rt| rt.seqno <= upper_bound && rt.contains_key(user_key))
            .map(|rt| rt.seqno)
            .max()
    }
}

/// Ambient counters, gated behind the `metrics` feature. Not part of the
/// reduction semantics; threaded through at zero cost when the feature is
/// off.
#[cfg(feature = "metrics")]
#[derive(Debug, Default, Clone)]
pub struct Stats {
    /// Entries read from the input iterator.
    pub entries_read: u64,
    /// Point entries emitted to the output stream.
    pub entries_emitted: u64,
    /// Point tombstones elided instead of emitted.
    pub tombstones_elided: u64,
    /// `MERGE` operand chains folded into a single output entry.
    pub merges_folded: u64,
    /// Range-delete fragments retained after stripe filtering.
    pub range_fragments_retained: u64,
    /// Range-delete fragments dropped by stripe filtering.
    pub range_fragments_dropped: u64,
}

/// Transforms a merged, globally sorted stream of internal entries into a
/// reduced compaction output stream.
///
/// Implements stripe-based snapshot reduction, merge-operand folding,
/// tombstone elision, and range-delete fragmentation/masking. See the
/// crate documentation for the reduction rules this applies per user key,
/// per stripe.
pub struct CompactionIterator<I, F = SweepFragmenter>
where
    I: Iterator<Item = Item>,
{
    inner: Peekable<I>,
    comparator: Box<dyn Comparator>,
    merge_operator: Box<dyn MergeOperator>,
    elide_predicate: Box<dyn ElidePredicate>,
    snapshots: Vec<SeqNo>,
    fragmenter: F,
    mask: ActiveRangeDeletes,
    pending_output: VecDeque<InternalValue>,
    errored: bool,
    elide_ranges: bool,

    #[cfg(feature = "metrics")]
    stats: Stats,
}

impl<I> CompactionIterator<I, SweepFragmenter>
where
    I: Iterator<Item = Item>,
{
    /// Creates a new compaction iterator, defaulting to a
    /// [`SweepFragmenter`] for range-delete fragmentation.
    ///
    /// `snapshots` must be sorted ascending (deduplicated).
    #[must_use]
    pub fn new(
        input: I,
        comparator: impl Comparator + 'static,
        merge_operator: impl MergeOperator + 'static,
        elide_predicate: impl ElidePredicate + 'static,
        snapshots: Vec<SeqNo>,
    ) -> Self {
        let fragmenter = SweepFragmenter::new(snapshots.clone());

        Self {
            inner: input.peekable(),
            comparator: Box::new(comparator),
            merge_operator: Box::new(merge_operator),
            elide_predicate: Box::new(elide_predicate),
            snapshots,
            fragmenter,
            mask: ActiveRangeDeletes::new(),
            pending_output: VecDeque::new(),
            errored: false,
            elide_ranges: false,

            #[cfg(feature = "metrics")]
            stats: Stats::default(),
        }
    }
}

impl<I, F> CompactionIterator<I, F>
where
    I: Iterator<Item = Item>,
    F: RangeDeleteFragmenter,
{
    /// Installs a fragmenter other than the default [`SweepFragmenter`].
    pub fn with_fragmenter<NF: RangeDeleteFragmenter>(
        self,
        fragmenter: NF,
    ) -> CompactionIterator<I, NF> {
        CompactionIterator {
            inner: self.inner,
            comparator: self.comparator,
            merge_operator: self.merge_operator,
            elide_predicate: self.elide_predicate,
            snapshots: self.snapshots,
            fragmenter,
            mask: self.mask,
            pending_output: self.pending_output,
            errored: self.errored,
            elide_ranges: self.elide_ranges,

            #[cfg(feature = "metrics")]
            stats: self.stats,
        }
    }

    /// Enables consulting [`ElidePredicate::elide_range`] for range
    /// tombstones retained at the lowest stripe. Off by default (see
    /// `elide_range_hook_is_inert_by_default`).
    #[must_use]
    pub fn with_elide_range(mut self, enabled: bool) -> Self {
        self.elide_ranges = enabled;
        self
    }

    /// Drains fragmented range tombstones whose start key is `< up_to`, or
    /// all of them if `up_to` is absent.
    pub fn tombstones(&mut self, up_to: Option<&[u8]>) -> Vec<Fragment> {
        let fragments = match up_to {
            Some(key) => self.fragmenter.flush_to(key),
            None => self.fragmenter.finish(),
        };

        #[cfg(feature = "metrics")]
        {
            self.stats.range_fragments_retained += fragments.len() as u64;
        }

        fragments
    }

    /// Releases the input. Returns the first latched error, if any.
    ///
    /// Rust's ownership already releases the input iterator on drop; this
    /// exists to surface a latched error at the caller's chosen moment,
    /// matching the positioning-call lifecycle the input iterator follows.
    pub fn close(self) -> crate::Result<()> {
        if self.errored {
            Err(Error::Input(Box::from(
                "compaction iterator closed after a latched error",
            )))
        } else {
            Ok(())
        }
    }

    /// Ambient counters, when the `metrics` feature is enabled.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn stripe_tracker(&self) -> StripeTracker<'_> {
        StripeTracker::new(&self.snapshots)
    }

    fn masked(&self, user_key: &[u8], entry_seqno: SeqNo, stripe_upper_bound: SeqNo) -> bool {
        self.mask
            .max_seqno_covering(user_key, stripe_upper_bound)
            .is_some_and(|tombstone_seqno| tombstone_seqno >= entry_seqno)
    }

    fn register_range_delete(&mut self, entry: &InternalValue, stripe: usize) {
        let start = entry.key.user_key.clone();
        let end = entry.value.clone();

        if self.elide_ranges
            && StripeTracker::is_lowest(stripe)
            && self.elide_predicate.elide_range(start.as_ref(), end.as_ref())
        {
            log::debug!("eliding RANGE_DELETE [{start:?}, {end:?}): lowest stripe, no lower data");
            #[cfg(feature = "metrics")]
            {
                self.stats.range_fragments_dropped += 1;
            }
            return;
        }

        log::trace!("range delete: [{start:?}, {end:?}) #{}", entry.key.seqno);

        self.mask
            .activate(RangeTombstone::new(start.clone(), end.clone(), entry.key.seqno));
        self.fragmenter.add(start, end, entry.key.seqno);
    }

    /// `true` if `self.inner`'s next entry shares `user_key`.
    fn peek_same_key(&mut self, user_key: &[u8]) -> bool {
        self.inner
            .peek()
            .and_then(|res| res.as_ref().ok())
            .is_some_and(|v| self.comparator.cmp(v.key.user_key.as_ref(), user_key) == std::cmp::Ordering::Equal)
    }

    /// `true` if `self.inner`'s next entry shares both `user_key` and `stripe`.
    fn peek_same_stripe(&mut self, user_key: &[u8], stripe: usize) -> bool {
        let tracker = self.stripe_tracker();
        self.inner
            .peek()
            .and_then(|res| res.as_ref().ok())
            .is_some_and(|v| {
                self.comparator.cmp(v.key.user_key.as_ref(), user_key) == std::cmp::Ordering::Equal
                    && tracker.stripe_of(v.key.seqno) == stripe
            })
    }

    /// Consumes and discards the remainder of the current stripe for
    /// `user_key`, except for `RangeDelete`/`Invalid` entries, which still
    /// need registering/emitting as they carry information beyond this
    /// stripe's point-entry decision.
    fn drain_rest_of_stripe(&mut self, user_key: &UserKey, stripe: usize) -> crate::Result<()> {
        while self.peek_same_stripe(user_key.as_ref(), stripe) {
            let next = self
                .inner
                .next()
                .expect("peek_same_stripe just confirmed an item exists")
                .map_err(propagate_input_error)?;

            #[cfg(feature = "metrics")]
            {
                self.stats.entries_read += 1;
            }

            match next.key.kind {
                Kind::RangeDelete => self.register_range_delete(&next, stripe),
                Kind::Invalid => self.pending_output.push_back(next),
                Kind::Set | Kind::Delete | Kind::Merge => {
                    log::trace!(
                        "dropping shadowed {:?} entry for {:?} within stripe {stripe}",
                        next.key.kind,
                        user_key
                    );
                }
            }
        }
        Ok(())
    }

    fn emit_point(&mut self, value: InternalValue) {
        #[cfg(feature = "metrics")]
        {
            self.stats.entries_emitted += 1;
        }
        self.pending_output.push_back(value);
    }

    fn elide_tombstone(&mut self, user_key: &[u8]) {
        log::debug!("eliding DELETE for {user_key:?}: lowest stripe, no lower data");
        #[cfg(feature = "metrics")]
        {
            self.stats.tombstones_elided += 1;
        }
    }

    /// Processes one stripe's first point entry (`Set` or `Delete`), then
    /// drains the rest of the stripe.
    fn finish_point_stripe(
        &mut self,
        entry: InternalValue,
        stripe: usize,
        upper_bound: SeqNo,
    ) -> crate::Result<()> {
        let user_key = entry.key.user_key.clone();

        let masked = self.masked(user_key.as_ref(), entry.key.seqno, upper_bound);

        match entry.key.kind {
            Kind::Set => {
                if masked {
                    log::trace!("SET {:?}#{} dropped: range-delete masked", user_key, entry.key.seqno);
                } else {
                    self.emit_point(entry);
                }
            }
            Kind::Delete => {
                if StripeTracker::is_lowest(stripe) && self.elide_predicate.elide(user_key.as_ref())
                {
                    self.elide_tombstone(user_key.as_ref());
                } else if masked {
                    log::trace!(
                        "DELETE {:?}#{} dropped: range-delete masked",
                        user_key,
                        entry.key.seqno
                    );
                } else {
                    self.emit_point(entry);
                }
            }
            _ => unreachable!("finish_point_stripe only called for Set/Delete"),
        }

        self.drain_rest_of_stripe(&user_key, stripe)
    }

    /// Folds a `MERGE` chain forward within one stripe (§4.2).
    fn fold_merge(
        &mut self,
        entry: InternalValue,
        stripe: usize,
        upper_bound: SeqNo,
    ) -> crate::Result<()> {
        let user_key = entry.key.user_key.clone();
        let top_seqno = entry.key.seqno;

        if self.masked(user_key.as_ref(), top_seqno, upper_bound) {
            log::trace!("MERGE {:?}#{} dropped: range-delete masked", user_key, top_seqno);
            return self.drain_rest_of_stripe(&user_key, stripe);
        }

        let mut acc: UserValue = entry.value;
        let mut relabel_to_set = false;
        let mut folded = 0u64;

        loop {
            if !self.peek_same_stripe(user_key.as_ref(), stripe) {
                log::trace!("MERGE chain for {:?} ends at stripe boundary", user_key);
                break;
            }

            let next_kind = self
                .inner
                .peek()
                .expect("peek_same_stripe just confirmed an item exists")
                .as_ref()
                .expect("peek_same_stripe only returns true for Ok entries")
                .key
                .kind;

            match next_kind {
                Kind::Merge => {
                    let next = self.inner.next().expect("just peeked").map_err(propagate_input_error)?;
                    #[cfg(feature = "metrics")]
                    {
                        self.stats.entries_read += 1;
                    }
                    acc = self.merge_operator.merge(user_key.as_ref(), acc.as_ref(), next.value.as_ref());
                    folded += 1;
                    log::trace!("MERGE folded operand #{}: {} folded so far", next.key.seqno, folded);
                }
                Kind::Set => {
                    let next = self.inner.next().expect("just peeked").map_err(propagate_input_error)?;
                    #[cfg(feature = "metrics")]
                    {
                        self.stats.entries_read += 1;
                    }
                    acc = self.merge_operator.merge(user_key.as_ref(), acc.as_ref(), next.value.as_ref());
                    relabel_to_set = true;
                    folded += 1;
                    log::trace!("MERGE chain terminated by SET #{}, relabeling output as SET", next.key.seqno);
                    break;
                }
                Kind::Delete => {
                    log::trace!("MERGE chain for {:?} stopped by DELETE barrier", user_key);
                    break;
                }
                Kind::RangeDelete => {
                    let rd = self.inner.next().expect("just peeked").map_err(propagate_input_error)?;
                    #[cfg(feature = "metrics")]
                    {
                        self.stats.entries_read += 1;
                    }
                    self.register_range_delete(&rd, stripe);
                    log::trace!("MERGE chain for {:?} stopped by RANGE_DELETE barrier", user_key);
                    break;
                }
                Kind::Invalid => {
                    let next = self.inner.next().expect("just peeked").map_err(propagate_input_error)?;
                    #[cfg(feature = "metrics")]
                    {
                        self.stats.entries_read += 1;
                    }
                    self.pending_output.push_back(next);
                }
            }
        }

        #[cfg(feature = "metrics")]
        {
            self.stats.merges_folded += 1;
        }

        let kind = if relabel_to_set { Kind::Set } else { Kind::Merge };
        let key = InternalKey::new(user_key.clone(), top_seqno, kind);
        self.emit_point(InternalValue::new(key, acc));

        self.drain_rest_of_stripe(&user_key, stripe)
    }

    /// Consumes and reduces the maximal run of entries sharing `head.key.user_key`.
    fn process_user_key_run(&mut self, mut head: InternalValue) -> crate::Result<()> {
        let user_key = head.key.user_key.clone();
        self.mask.expire_until(user_key.as_ref());

        loop {
            let tracker = self.stripe_tracker();
            let stripe = tracker.stripe_of(head.key.seqno);
            let upper_bound = tracker.upper_bound(stripe);

            log::trace!(
                "stripe {stripe} (upper_bound={upper_bound}) for {:?}#{}",
                user_key,
                head.key.seqno
            );

            match head.key.kind {
                Kind::Set | Kind::Delete => {
                    self.finish_point_stripe(head, stripe, upper_bound)?;
                }
                Kind::Merge => {
                    self.fold_merge(head, stripe, upper_bound)?;
                }
                Kind::RangeDelete => {
                    self.register_range_delete(&head, stripe);
                }
                Kind::Invalid => {
                    self.pending_output.push_back(head);
                }
            }

            if !self.peek_same_key(user_key.as_ref()) {
                break;
            }

            head = self
                .inner
                .next()
                .expect("peek_same_key just confirmed an item exists")
                .map_err(propagate_input_error)?;

            #[cfg(feature = "metrics")]
            {
                self.stats.entries_read += 1;
            }
        }

        Ok(())
    }
}

fn propagate_input_error(e: Error) -> Error {
    if matches!(e, Error::CorruptEntry { .. }) {
        log::error!("corrupt entry latched: {e}");
    } else {
        log::error!("input error: {e}");
    }
    e
}

impl<I, F> Iterator for CompactionIterator<I, F>
where
    I: Iterator<Item = Item>,
    F: RangeDeleteFragmenter,
{
    type Item = Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.errored {
                return None;
            }

            if let Some(v) = self.pending_output.pop_front() {
                return Some(Ok(v));
            }

            let head = match self.inner.next() {
                None => return None,
                Some(Err(e)) => {
                    self.errored = true;
                    return Some(Err(propagate_input_error(e)));
                }
                Some(Ok(v)) => v,
            };

            #[cfg(feature = "metrics")]
            {
                self.stats.entries_read += 1;
            }

            if let Err(e) = self.process_user_key_run(head) {
                self.errored = true;
                return Some(Err(e));
            }
        }
    }
}
