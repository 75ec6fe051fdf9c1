// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    key::{InternalKey, Kind},
    Slice,
};

/// User defined key
pub type UserKey = Slice;

/// User defined data (blob of bytes)
#[allow(clippy::module_name_repetitions)]
pub type UserValue = Slice;

/// Sequence number - a monotonically increasing counter
///
/// Values with the same seqno are part of the same batch.
///
/// A value with a higher sequence number shadows an item with the
/// same key and lower sequence number. This enables MVCC, and is what lets
/// the compaction iterator partition entries into snapshot stripes.
pub type SeqNo = u64;

/// Internal representation of KV pairs, the item type the compaction
/// iterator consumes and emits.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Eq)]
pub struct InternalValue {
    /// Internal key
    pub key: InternalKey,

    /// User-defined value - an arbitrary byte array.
    ///
    /// For a [`Kind::RangeDelete`] entry, this holds the exclusive end of
    /// the deleted range rather than a regular payload.
    pub value: UserValue,
}

impl InternalValue {
    /// Creates a new [`InternalValue`].
    ///
    /// # Panics
    ///
    /// Panics if the key is empty or longer than 2^16 bytes, or the value is
    /// longer than 2^32 bytes.
    pub fn new<V: Into<UserValue>>(key: InternalKey, value: V) -> Self {
        let value = value.into();

        assert!(!key.user_key.is_empty(), "key may not be empty");
        assert!(
            u32::try_from(value.len()).is_ok(),
            "values can be 2^32 bytes in length"
        );

        Self { key, value }
    }

    /// Creates a new [`InternalValue`] from its components.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty or longer than 2^16 bytes, or the value is
    /// longer than 2^32 bytes.
    pub fn from_components<K: Into<UserKey>, V: Into<UserValue>>(
        user_key: K,
        value: V,
        seqno: SeqNo,
        kind: Kind,
    ) -> Self {
        let key = InternalKey::new(user_key, seqno, kind);
        Self::new(key, value)
    }

    /// Creates a new `Set` entry.
    pub fn new_set<K: Into<UserKey>, V: Into<UserValue>>(
        user_key: K,
        value: V,
        seqno: SeqNo,
    ) -> Self {
        Self::from_components(user_key, value, seqno, Kind::Set)
    }

    /// Creates a new point tombstone.
    pub fn new_tombstone<K: Into<UserKey>>(key: K, seqno: SeqNo) -> Self {
        let key = InternalKey::new(key, seqno, Kind::Delete);
        Self::new(key, Slice::empty())
    }

    /// Creates a new unresolved merge operand.
    pub fn new_merge<K: Into<UserKey>, V: Into<UserValue>>(
        user_key: K,
        operand: V,
        seqno: SeqNo,
    ) -> Self {
        Self::from_components(user_key, operand, seqno, Kind::Merge)
    }

    /// Creates a new range tombstone `[start, end)` at `seqno`.
    pub fn new_range_delete<K: Into<UserKey>>(start: K, end: K, seqno: SeqNo) -> Self {
        let key = InternalKey::new(start, seqno, Kind::RangeDelete);
        Self::new(key, end.into())
    }

    #[doc(hidden)]
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.key.is_tombstone()
    }

    /// Approximate heap size of this entry, for callers tracking memory budgets.
    #[must_use]
    pub fn size(&self) -> usize {
        std::mem::size_of::<SeqNo>() + self.key.user_key.len() + self.value.len()
    }
}

impl PartialEq for InternalValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl PartialOrd for InternalValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.key.cmp(&other.key))
    }
}

// Order by the same total order as InternalKey: this is what the heap merge
// and the per-stripe reducer both rely on.
impl Ord for InternalValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl std::fmt::Debug for InternalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} => {:?}",
            self.key,
            if self.value.len() >= 64 {
                format!("[ ... {} bytes ]", self.value.len())
            } else {
                format!("{:?}", self.value)
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn pik_cmp_user_key() {
        let a = InternalKey::new(*b"a", 0, Kind::Set);
        let b = InternalKey::new(*b"b", 0, Kind::Set);
        assert!(a < b);
    }

    #[test]
    fn pik_cmp_seqno() {
        let a = InternalKey::new(*b"a", 0, Kind::Set);
        let b = InternalKey::new(*b"a", 1, Kind::Set);
        assert!(a > b);
    }

    #[test]
    fn new_set_roundtrip() {
        let v = InternalValue::new_set(*b"a", *b"v", 5);
        assert_eq!(v.key.kind, Kind::Set);
        assert_eq!(v.value.as_ref(), b"v");
    }

    #[test]
    fn new_tombstone_is_tombstone() {
        let v = InternalValue::new_tombstone(*b"a", 5);
        assert!(v.is_tombstone());
        assert!(v.value.is_empty());
    }

    #[test]
    fn new_range_delete_stores_end_in_value() {
        let v = InternalValue::new_range_delete(*b"a", *b"z", 5);
        assert_eq!(v.key.kind, Kind::RangeDelete);
        assert_eq!(v.key.user_key.as_ref(), b"a");
        assert_eq!(v.value.as_ref(), b"z");
    }
}
