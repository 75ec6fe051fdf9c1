// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{SeqNo, UserKey};
use std::cmp::Reverse;

/// The kind of an [`InternalKey`].
///
/// A closed set: compaction treats this as a tagged variant, never an
/// open-ended hierarchy. For a `RangeDelete` entry, `user_key` is the
/// range start and the paired value is the range end. An `Invalid` entry
/// carries whatever raw bytes could not be classified, and is passed
/// through to the output stream unmodified exactly once — it is not an
/// error (see [`crate::Error`]).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[allow(clippy::module_name_repetitions)]
pub enum Kind {
    /// A regular value.
    Set,

    /// A point deletion.
    Delete,

    /// An unresolved merge operand.
    Merge,

    /// A range deletion `[user_key, end)`, `end` carried in the paired value.
    RangeDelete,

    /// An entry whose kind byte did not decode to any of the above.
    Invalid,
}

impl Kind {
    /// Recovers a [`Kind`] from a raw discriminant, as a collaborator
    /// upstream of this crate (e.g. a block decoder) would have to.
    ///
    /// Unlike `TryFrom<u8>`, this never fails: an unrecognized byte maps to
    /// [`Kind::Invalid`] rather than propagating a decode error.
    #[must_use]
    pub fn from_raw(byte: u8) -> Self {
        match byte {
            0 => Self::Set,
            1 => Self::Delete,
            2 => Self::Merge,
            3 => Self::RangeDelete,
            _ => Self::Invalid,
        }
    }
}

/// `(user_key, seqno, kind)`, the unit the compaction iterator sorts and reduces.
#[derive(Clone, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct InternalKey {
    /// The application's key bytes.
    pub user_key: UserKey,

    /// Monotonic version stamp assigned at write time; higher is newer.
    pub seqno: SeqNo,

    /// The kind of this entry.
    pub kind: Kind,
}

impl std::fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}:{:?}", self.user_key, self.seqno, self.kind)
    }
}

impl InternalKey {
    /// Creates a new [`InternalKey`].
    ///
    /// # Panics
    ///
    /// Panics if the key is longer than 2^16 bytes.
    pub fn new<K: Into<UserKey>>(user_key: K, seqno: SeqNo, kind: Kind) -> Self {
        let user_key = user_key.into();

        assert!(
            user_key.len() <= u16::MAX.into(),
            "keys can be 65535 bytes in length"
        );

        Self {
            user_key,
            seqno,
            kind,
        }
    }

    /// Returns `true` if this key is a point deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self.kind, Kind::Delete)
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Order by user key ascending, THEN by sequence number descending, THEN by
// kind descending as a tiebreaker. The seqno/kind ordering is what lets the
// per-stripe reducer walk a user key's versions newest-first without
// needing to look ahead.
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.user_key, Reverse(self.seqno), Reverse(self.kind)).cmp(&(
            &other.user_key,
            Reverse(other.seqno),
            Reverse(other.kind),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn cmp_user_key() {
        let a = InternalKey::new(*b"a", 0, Kind::Set);
        let b = InternalKey::new(*b"b", 0, Kind::Set);
        assert!(a < b);
    }

    #[test]
    fn cmp_seqno_descending() {
        let a = InternalKey::new(*b"a", 0, Kind::Set);
        let b = InternalKey::new(*b"a", 1, Kind::Set);
        assert!(a > b, "higher seqno sorts first for the same user key");
    }

    #[test]
    fn cmp_kind_descending_tiebreak() {
        let set = InternalKey::new(*b"a", 5, Kind::Set);
        let delete = InternalKey::new(*b"a", 5, Kind::Delete);
        // Same user_key, same seqno: Kind breaks the tie, descending by
        // declaration order, so Delete (a "larger" kind) sorts first.
        assert!(delete < set);
    }

    #[test]
    fn from_raw_unknown_is_invalid() {
        assert_eq!(Kind::from_raw(255), Kind::Invalid);
        assert_eq!(Kind::from_raw(0), Kind::Set);
        assert_eq!(Kind::from_raw(3), Kind::RangeDelete);
    }
}
