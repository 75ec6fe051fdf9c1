// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{SeqNo, UserKey};

/// Errors that can occur while driving a [`crate::compaction::CompactionIterator`].
#[derive(Debug)]
pub enum Error {
    /// An upstream collaborator (the merging iterator, the input stream
    /// itself) reported a failure this crate cannot recover from on its
    /// own.
    Input(Box<dyn std::error::Error + Send + Sync>),

    /// A decoded entry's kind byte did not belong to the closed set this
    /// crate knows how to reduce.
    ///
    /// This is distinct from a [`crate::Kind::Invalid`] passthrough entry,
    /// which is not an error: `CorruptEntry` is only raised by callers that
    /// decode raw bytes themselves (see [`crate::Kind::from_raw`]) and
    /// choose to treat an out-of-range discriminant as fatal rather than as
    /// `Invalid`.
    CorruptEntry {
        /// The user key of the offending entry.
        user_key: UserKey,
        /// The sequence number of the offending entry.
        seqno: SeqNo,
        /// The raw, unrecognized kind byte.
        raw_kind: u8,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input(e) => write!(f, "input error: {e}"),
            Self::CorruptEntry {
                user_key,
                seqno,
                raw_kind,
            } => write!(
                f,
                "corrupt entry: key={user_key:?} seqno={seqno} raw_kind={raw_kind}"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Compaction iterator result.
pub type Result<T> = std::result::Result<T, Error>;
