//! Log of updates that arrive while an index is being populated.
//!
//! # Record Format
//!
//! ```text
//! ADDED:   [0][key + value entry]
//! CHANGED: [1][key-only entry: before][key + value entry: after]
//! REMOVED: [2][key-only entry]
//! ```

use std::path::PathBuf;

use super::block_entry::BlockEntry;
use super::entry_storage::{EntryReader, SimpleEntryStorage};
use super::{StorageError, cursor::WriteCursor};
use crate::key::{GenericKey, GenericLayout, Layout, NullValue};
use crate::update::{IndexEntryUpdate, UpdateMode};

type Entry = BlockEntry<GenericKey, NullValue>;

/// Append-only update log. Keys are built in scratch keys owned by the
/// storage.
#[derive(Debug)]
pub struct IndexUpdateStorage {
    storage: SimpleEntryStorage,
    layout: GenericLayout,
    key1: GenericKey,
    key2: GenericKey,
    value: NullValue,
}

impl IndexUpdateStorage {
    #[must_use]
    pub fn new(path: PathBuf, buffer_size: usize, layout: GenericLayout) -> Self {
        Self {
            storage: SimpleEntryStorage::new(path, buffer_size),
            key1: layout.new_key(),
            key2: layout.new_key(),
            value: NullValue,
            layout,
        }
    }

    /// Updates added so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.storage.count()
    }

    pub fn add(&mut self, update: &IndexEntryUpdate) -> Result<(), StorageError> {
        let layout: &dyn Layout<GenericKey, NullValue> = &self.layout;
        match update {
            IndexEntryUpdate::Added { entity_id, values } => {
                self.key1.write_values(*entity_id, values)?;
                let size = 1 + Entry::entry_size(layout, &self.key1, &self.value)?;
                let page = self.storage.prepare_write(size)?;
                page.put_u8(UpdateMode::Added as u8);
                Entry::write(page, layout, &self.key1, &self.value)
            }
            IndexEntryUpdate::Changed {
                entity_id,
                before,
                after,
            } => {
                self.key1.write_values(*entity_id, before)?;
                self.key2.write_values(*entity_id, after)?;
                let size = 1
                    + Entry::key_size(layout, &self.key1)?
                    + Entry::entry_size(layout, &self.key2, &self.value)?;
                let page = self.storage.prepare_write(size)?;
                page.put_u8(UpdateMode::Changed as u8);
                Entry::write_key(page, layout, &self.key1)?;
                Entry::write(page, layout, &self.key2, &self.value)
            }
            IndexEntryUpdate::Removed { entity_id, values } => {
                self.key1.write_values(*entity_id, values)?;
                let size = 1 + Entry::key_size(layout, &self.key1)?;
                let page = self.storage.prepare_write(size)?;
                page.put_u8(UpdateMode::Removed as u8);
                Entry::write_key(page, layout, &self.key1)
            }
        }
    }

    pub fn done_adding(&mut self) -> Result<(), StorageError> {
        self.storage.done_adding()
    }

    /// Replay the updates in the order they were added.
    pub fn reader(&self) -> Result<IndexUpdateCursor, StorageError> {
        Ok(IndexUpdateCursor {
            reader: self.storage.reader()?,
            layout: self.layout,
            mode: None,
            key1: self.layout.new_key(),
            key2: self.layout.new_key(),
            value: NullValue,
        })
    }

    /// Delete the log file.
    pub fn close(self) -> Result<(), StorageError> {
        self.storage.close()
    }
}

/// Cursor over a completed update log.
///
/// For [`UpdateMode::Changed`], [`key`](Self::key) is the key before the
/// change and [`key2`](Self::key2) the key after it.
#[derive(Debug)]
pub struct IndexUpdateCursor {
    reader: EntryReader,
    layout: GenericLayout,
    mode: Option<UpdateMode>,
    key1: GenericKey,
    key2: GenericKey,
    value: NullValue,
}

impl IndexUpdateCursor {
    /// Advance to the next update. Returns `false` at the end of the log.
    pub fn next(&mut self) -> Result<bool, StorageError> {
        let layout: &dyn Layout<GenericKey, NullValue> = &self.layout;
        let Some((discriminant, cursor)) = self.reader.next_record()? else {
            self.mode = None;
            return Ok(false);
        };
        let mode = UpdateMode::try_from(discriminant)
            .map_err(|d| StorageError::Corruption(format!("unknown update mode {d}")))?;
        match mode {
            UpdateMode::Added => Entry::read(cursor, layout, &mut self.key1, &mut self.value)?,
            UpdateMode::Changed => {
                Entry::read_key(cursor, layout, &mut self.key1)?;
                Entry::read(cursor, layout, &mut self.key2, &mut self.value)?;
            }
            UpdateMode::Removed => Entry::read_key(cursor, layout, &mut self.key1)?,
        }
        self.mode = Some(mode);
        Ok(true)
    }

    /// Mode of the current update, `None` before the first or after the last.
    #[must_use]
    pub const fn update_mode(&self) -> Option<UpdateMode> {
        self.mode
    }

    #[must_use]
    pub const fn key(&self) -> &GenericKey {
        &self.key1
    }

    #[must_use]
    pub const fn key2(&self) -> &GenericKey {
        &self.key2
    }

    #[must_use]
    pub const fn value(&self) -> &NullValue {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;
    use crate::values::Value;

    fn values(key: &GenericKey) -> Vec<Value> {
        let mut copy = GenericKey::new(key.number_of_slots());
        copy.copy_from(key);
        copy.as_values().expect("values")
    }

    #[test]
    fn test_updates_replay_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage =
            IndexUpdateStorage::new(dir.path().join("updates"), PAGE_SIZE, GenericLayout::new(1));
        let updates = vec![
            IndexEntryUpdate::added(1, vec![Value::text("a")]),
            IndexEntryUpdate::changed(2, vec![Value::Int(1)], vec![Value::Int(2)]),
            IndexEntryUpdate::removed(3, vec![Value::Boolean(true)]),
        ];
        for _ in 0..200 {
            for update in &updates {
                storage.add(update).expect("add");
            }
        }
        storage.done_adding().expect("done");
        assert_eq!(storage.count(), 600);

        let mut cursor = storage.reader().expect("reader");
        for _ in 0..200 {
            assert!(cursor.next().expect("next"));
            assert_eq!(cursor.update_mode(), Some(UpdateMode::Added));
            assert_eq!(cursor.key().entity_id(), 1);
            assert_eq!(values(cursor.key()), vec![Value::text("a")]);

            assert!(cursor.next().expect("next"));
            assert_eq!(cursor.update_mode(), Some(UpdateMode::Changed));
            assert_eq!(values(cursor.key()), vec![Value::Int(1)]);
            assert_eq!(values(cursor.key2()), vec![Value::Int(2)]);
            assert_eq!(cursor.key2().entity_id(), 2);

            assert!(cursor.next().expect("next"));
            assert_eq!(cursor.update_mode(), Some(UpdateMode::Removed));
            assert_eq!(values(cursor.key()), vec![Value::Boolean(true)]);
        }
        assert!(!cursor.next().expect("end"));
        assert_eq!(cursor.update_mode(), None);
        storage.close().expect("close");
    }

    #[test]
    fn test_empty_log() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage =
            IndexUpdateStorage::new(dir.path().join("updates"), PAGE_SIZE, GenericLayout::new(2));
        storage.done_adding().expect("done");
        let mut cursor = storage.reader().expect("reader");
        assert!(!cursor.next().expect("next"));
    }

    #[test]
    fn test_wrong_value_count_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage =
            IndexUpdateStorage::new(dir.path().join("updates"), PAGE_SIZE, GenericLayout::new(2));
        let update = IndexEntryUpdate::added(1, vec![Value::Int(1)]);
        assert!(matches!(storage.add(&update), Err(StorageError::Key(_))));
    }

    #[test]
    fn test_oversized_update_leaves_log_intact() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage =
            IndexUpdateStorage::new(dir.path().join("updates"), PAGE_SIZE, GenericLayout::new(1));
        let huge = Value::text(&"x".repeat(9_000));
        storage
            .add(&IndexEntryUpdate::added(1, vec![Value::Int(1)]))
            .expect("add");
        for update in [
            IndexEntryUpdate::added(2, vec![huge.clone()]),
            IndexEntryUpdate::changed(3, vec![Value::Int(1)], vec![huge.clone()]),
            IndexEntryUpdate::removed(4, vec![huge]),
        ] {
            assert!(matches!(
                storage.add(&update),
                Err(StorageError::EntryTooLarge { .. })
            ));
        }
        assert_eq!(storage.count(), 1);
        storage
            .add(&IndexEntryUpdate::removed(5, vec![Value::Int(2)]))
            .expect("add");
        storage.done_adding().expect("done");

        let mut cursor = storage.reader().expect("reader");
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.update_mode(), Some(UpdateMode::Added));
        assert_eq!(values(cursor.key()), vec![Value::Int(1)]);
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.update_mode(), Some(UpdateMode::Removed));
        assert_eq!(cursor.key().entity_id(), 5);
        assert!(!cursor.next().expect("end"));
        storage.close().expect("close");
    }
}
