//! What a populator needs from the ordered key/value tree it fills.

use crate::merge::BlockEntryCursor;
use crate::storage::StorageError;

/// Decision of a [`ValueMerger`] about an entry whose key is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Keep the existing entry.
    Unchanged,
    /// Overwrite the existing value with the new one.
    Replaced,
}

/// Called by [`TreeWriter::merge`] when the key being inserted compares equal
/// to an existing key.
pub trait ValueMerger<K, V> {
    fn merge(
        &mut self,
        existing_key: &K,
        new_key: &K,
        existing_value: &V,
        new_value: &V,
    ) -> MergeOutcome;
}

/// Forward cursor over a key range of a tree.
pub type Seeker<'a, K, V> = Box<dyn BlockEntryCursor<K, V> + 'a>;

/// Single-threaded batch writer into a tree.
pub trait TreeWriter<K, V> {
    /// Insert `key`, or let `merger` decide if an equal key exists.
    fn merge(
        &mut self,
        key: &K,
        value: &V,
        merger: &mut dyn ValueMerger<K, V>,
    ) -> Result<(), StorageError>;

    /// Insert `key`, overwriting the value of an equal key.
    fn put(&mut self, key: &K, value: &V) -> Result<(), StorageError>;

    /// Remove the entry equal to `key`. Returns whether one was found.
    fn remove(&mut self, key: &K) -> Result<bool, StorageError>;

    /// Flush pending writes.
    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// An ordered key/value tree.
pub trait IndexTree<K, V>: Send + Sync {
    /// Entries from `from` (inclusive) to `to` (exclusive) in key order. When
    /// `from` and `to` compare equal, the entries equal to them.
    fn seek(&self, from: &K, to: &K) -> Result<Seeker<'_, K, V>, StorageError>;

    fn writer(&self) -> Result<Box<dyn TreeWriter<K, V> + '_>, StorageError>;
}
