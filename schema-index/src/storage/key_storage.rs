//! Key-only append log.

use std::path::PathBuf;
use std::sync::Arc;

use super::block_entry::BlockEntry;
use super::cursor::WriteCursor;
use super::entry_storage::{EntryReader, SimpleEntryStorage};
use super::{SharedLayout, StorageError};

const KEY_TYPE: u8 = 1;

/// Append-only log of keys, read back in the order they were added.
pub struct IndexKeyStorage<K, V> {
    storage: SimpleEntryStorage,
    layout: SharedLayout<K, V>,
}

impl<K, V> IndexKeyStorage<K, V> {
    #[must_use]
    pub fn new(path: PathBuf, buffer_size: usize, layout: SharedLayout<K, V>) -> Self {
        Self {
            storage: SimpleEntryStorage::new(path, buffer_size),
            layout,
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.storage.count()
    }

    pub fn add(&mut self, key: &K) -> Result<(), StorageError> {
        let layout = self.layout.as_ref();
        let size = 1 + BlockEntry::key_size(layout, key)?;
        let page = self.storage.prepare_write(size)?;
        page.put_u8(KEY_TYPE);
        BlockEntry::write_key(page, layout, key)
    }

    pub fn done_adding(&mut self) -> Result<(), StorageError> {
        self.storage.done_adding()
    }

    pub fn reader(&self) -> Result<KeyEntryCursor<K, V>, StorageError> {
        Ok(KeyEntryCursor {
            reader: self.storage.reader()?,
            key: self.layout.new_key(),
            layout: Arc::clone(&self.layout),
        })
    }

    /// Delete the log file.
    pub fn close(self) -> Result<(), StorageError> {
        self.storage.close()
    }
}

impl<K, V> std::fmt::Debug for IndexKeyStorage<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexKeyStorage")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

/// Cursor over the keys of a completed [`IndexKeyStorage`].
pub struct KeyEntryCursor<K, V> {
    reader: EntryReader,
    layout: SharedLayout<K, V>,
    key: K,
}

impl<K, V> KeyEntryCursor<K, V> {
    /// Advance to the next key. Returns `false` at the end of the log.
    pub fn next(&mut self) -> Result<bool, StorageError> {
        let Some((discriminant, cursor)) = self.reader.next_record()? else {
            return Ok(false);
        };
        if discriminant != KEY_TYPE {
            return Err(StorageError::Corruption(format!(
                "unexpected entry type {discriminant} in key log"
            )));
        }
        BlockEntry::read_key(cursor, self.layout.as_ref(), &mut self.key)?;
        Ok(true)
    }

    pub const fn key(&self) -> &K {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{GenericKey, GenericLayout, NullValue};
    use crate::storage::PAGE_SIZE;
    use crate::testing::{LongLayout, TestValue};
    use crate::values::Value;

    #[test]
    fn test_keys_read_back_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let layout: SharedLayout<i64, TestValue> = Arc::new(LongLayout);
        let mut storage = IndexKeyStorage::new(dir.path().join("keys"), 64, layout);
        let keys = [5, -1, 5, 1 << 40, 0];
        for key in keys {
            storage.add(&key).expect("add");
        }
        storage.done_adding().expect("done");

        let mut cursor = storage.reader().expect("reader");
        let mut read = Vec::new();
        while cursor.next().expect("next") {
            read.push(*cursor.key());
        }
        assert_eq!(read, keys);
        storage.close().expect("close");
    }

    #[test]
    fn test_oversized_key_leaves_log_intact() {
        let dir = tempfile::tempdir().expect("temp dir");
        let layout: SharedLayout<GenericKey, NullValue> = Arc::new(GenericLayout::new(1));
        let mut storage = IndexKeyStorage::new(dir.path().join("keys"), PAGE_SIZE, layout);
        let mut key = GenericKey::new(1);
        key.write_values(1, &[Value::text(&"x".repeat(9_000))])
            .expect("write");
        assert!(matches!(
            storage.add(&key),
            Err(StorageError::EntryTooLarge { .. })
        ));
        assert_eq!(storage.count(), 0);

        key.write_values(2, &[Value::Int(7)]).expect("write");
        storage.add(&key).expect("add");
        storage.done_adding().expect("done");

        let mut cursor = storage.reader().expect("reader");
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.key().entity_id(), 2);
        assert!(!cursor.next().expect("end"));
        storage.close().expect("close");
    }
}
