//! Sorted entry streams.

use crate::storage::{BlockEntry, StorageError};

/// Forward-only cursor over sorted key/value entries.
///
/// `key` and `value` are only valid after `next` returned `true`, and only
/// until the following call to `next`.
pub trait BlockEntryCursor<K, V>: Send {
    /// Advance to the next entry. Returns `false` when exhausted.
    fn next(&mut self) -> Result<bool, StorageError>;

    fn key(&self) -> &K;

    fn value(&self) -> &V;

    /// Release the cursor's resources. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

impl<K, V, C: BlockEntryCursor<K, V> + ?Sized> BlockEntryCursor<K, V> for Box<C> {
    fn next(&mut self) -> Result<bool, StorageError> {
        (**self).next()
    }

    fn key(&self) -> &K {
        (**self).key()
    }

    fn value(&self) -> &V {
        (**self).value()
    }

    fn close(&mut self) -> Result<(), StorageError> {
        (**self).close()
    }
}

/// Cursor over an in-memory batch of entries.
#[derive(Debug)]
pub struct ListBasedBlockEntryCursor<K, V> {
    entries: Vec<BlockEntry<K, V>>,
    position: usize,
}

impl<K, V> ListBasedBlockEntryCursor<K, V> {
    #[must_use]
    pub const fn new(entries: Vec<BlockEntry<K, V>>) -> Self {
        Self {
            entries,
            position: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn current(&self) -> &BlockEntry<K, V> {
        &self.entries[self.position - 1]
    }
}

impl<K: Send, V: Send> BlockEntryCursor<K, V> for ListBasedBlockEntryCursor<K, V> {
    fn next(&mut self) -> Result<bool, StorageError> {
        if self.position < self.entries.len() {
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn key(&self) -> &K {
        self.current().key()
    }

    fn value(&self) -> &V {
        self.current().value()
    }
}
