// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The compaction merge iterator of a log-structured merge-tree storage engine.
//!
//! ##### About
//!
//! This crate implements the semantic core of compaction: given a single,
//! already-merged, globally sorted stream of internal entries (the output of
//! a k-way [`merge::MergingIter`] over a set of sorted runs), it reduces that
//! stream into the entries a compaction output run should actually contain.
//!
//! Three things happen during reduction, per user key, per *snapshot
//! stripe* (the ranges a sorted, ascending list of open snapshots'
//! sequence numbers partitions the sequence axis into):
//!
//! - Only the newest entry in a stripe survives; older entries in the same
//!   stripe are shadowed and dropped.
//! - `MERGE` operand chains are folded together via a user-supplied
//!   [`compaction::MergeOperator`], stopping at a `SET` (which relabels the
//!   fold as `SET`), a `DELETE`, or a covering range tombstone.
//! - Range tombstones ([`Kind::RangeDelete`]) mask point entries they cover
//!   and are themselves fragmented into disjoint, per-stripe pieces by a
//!   pluggable [`compaction::RangeDeleteFragmenter`].
//!
//! A point tombstone at the lowest stripe can additionally be elided
//! entirely when a caller-supplied [`compaction::ElidePredicate`] confirms
//! no deeper data for that key remains to shadow.
//!
//! # Example usage
//!
//! ```
//! use compaction_merge_iter::{
//!     compaction::{ByteComparator, CompactionIterator, ElidePredicate, MergeOperator},
//!     InternalValue, UserValue,
//! };
//!
//! struct NoopMerge;
//!
//! impl MergeOperator for NoopMerge {
//!     fn merge(&self, _user_key: &[u8], newer: &[u8], _older: &[u8]) -> UserValue {
//!         newer.into()
//!     }
//! }
//!
//! struct NeverElide;
//!
//! impl ElidePredicate for NeverElide {
//!     fn elide(&self, _user_key: &[u8]) -> bool {
//!         false
//!     }
//! }
//!
//! let input = vec![
//!     Ok(InternalValue::new_set(*b"a", *b"v1", 2)),
//!     Ok(InternalValue::new_set(*b"a", *b"v0", 1)),
//! ]
//! .into_iter();
//!
//! let mut iter = CompactionIterator::new(input, ByteComparator, NoopMerge, NeverElide, vec![]);
//! let out = iter.next().unwrap()?;
//! assert_eq!(out.value.as_ref(), b"v1");
//! assert!(iter.next().is_none());
//! #
//! # Ok::<(), compaction_merge_iter::Error>(())
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        }
    };
}

pub mod compaction;
mod error;
mod key;

#[doc(hidden)]
pub mod merge;

mod range_tombstone;
mod seqno;
mod slice;
mod value;

/// KV-tuple, typically returned by an iterator.
pub type KvPair = (UserKey, UserValue);

#[doc(hidden)]
pub use merge::BoxedIterator;

pub use {
    error::{Error, Result},
    key::{InternalKey, Kind},
    merge::MergingIter,
    range_tombstone::RangeTombstone,
    seqno::SequenceNumberCounter,
    slice::Slice,
    value::{InternalValue, SeqNo, UserKey, UserValue},
};
