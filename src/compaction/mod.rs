// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The compaction reduction pipeline: snapshot stripes, merge-operand
//! folding, tombstone elision, and range-delete fragmentation.

mod fragmenter;
mod iterator;
mod stripe;

pub use fragmenter::{Fragment, RangeDeleteFragmenter, SweepFragmenter};
pub use iterator::{ByteComparator, Comparator, CompactionIterator, ElidePredicate, MergeOperator};

#[cfg(feature = "metrics")]
pub use iterator::Stats;
