use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

use crate::merge::ListBasedBlockEntryCursor;
use crate::populator::{IndexTree, MergeOutcome, Seeker, TreeWriter, ValueMerger};
use crate::storage::cursor::{PageBuffer, SliceCursor};
use crate::storage::{BlockEntry, SharedLayout, StorageError};

/// Sorted vector standing in for an on-disk tree.
///
/// Keys are encoded and decoded on the way in, so the tree holds what a
/// persistent tree would read back.
pub struct InMemoryTree<K, V> {
    layout: SharedLayout<K, V>,
    entries: Mutex<Vec<BlockEntry<K, V>>>,
}

impl<K, V> InMemoryTree<K, V> {
    pub fn new(layout: SharedLayout<K, V>) -> Self {
        Self {
            layout,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Map every entry in key order.
    pub fn collect<T>(&self, mut f: impl FnMut(&K, &V) -> T) -> Vec<T> {
        self.lock()
            .iter()
            .map(|entry| f(entry.key(), entry.value()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BlockEntry<K, V>>> {
        self.entries.lock().expect("tree lock poisoned")
    }

    fn persisted(&self, key: &K, value: &V) -> Result<BlockEntry<K, V>, StorageError> {
        let size = self.layout.key_size(key);
        let mut buffer = PageBuffer::new(size);
        self.layout.write_key(&mut buffer, key);
        let mut stored_key = self.layout.new_key();
        self.layout
            .read_key(&mut SliceCursor::new(buffer.as_bytes()), &mut stored_key, size)?;
        let mut stored_value = self.layout.new_value();
        self.layout.copy_value(value, &mut stored_value);
        Ok(BlockEntry::new(stored_key, stored_value))
    }

    fn search(&self, entries: &[BlockEntry<K, V>], key: &K) -> Result<usize, usize> {
        entries.binary_search_by(|entry| self.layout.compare(entry.key(), key))
    }
}

impl<K: Send + 'static, V: Send + 'static> IndexTree<K, V> for InMemoryTree<K, V> {
    fn seek(&self, from: &K, to: &K) -> Result<Seeker<'_, K, V>, StorageError> {
        let exact = self.layout.compare(from, to) == Ordering::Equal;
        let layout = self.layout.as_ref();
        let entries = self
            .lock()
            .iter()
            .filter(|entry| {
                let lower = layout.compare(entry.key(), from);
                if exact {
                    lower == Ordering::Equal
                } else {
                    lower != Ordering::Less && layout.compare(entry.key(), to) == Ordering::Less
                }
            })
            .map(|entry| BlockEntry::copied(layout, entry.key(), entry.value()))
            .collect();
        Ok(Box::new(ListBasedBlockEntryCursor::new(entries)))
    }

    fn writer(&self) -> Result<Box<dyn TreeWriter<K, V> + '_>, StorageError> {
        Ok(Box::new(InMemoryWriter { tree: self }))
    }
}

struct InMemoryWriter<'a, K, V> {
    tree: &'a InMemoryTree<K, V>,
}

impl<K, V> TreeWriter<K, V> for InMemoryWriter<'_, K, V> {
    fn merge(
        &mut self,
        key: &K,
        value: &V,
        merger: &mut dyn ValueMerger<K, V>,
    ) -> Result<(), StorageError> {
        let mut entries = self.tree.lock();
        match self.tree.search(&entries, key) {
            Ok(index) => {
                let existing = &entries[index];
                if merger.merge(existing.key(), key, existing.value(), value)
                    == MergeOutcome::Replaced
                {
                    let entry = self.tree.persisted(existing.key(), value)?;
                    entries[index] = entry;
                }
            }
            Err(index) => entries.insert(index, self.tree.persisted(key, value)?),
        }
        Ok(())
    }

    fn put(&mut self, key: &K, value: &V) -> Result<(), StorageError> {
        let mut entries = self.tree.lock();
        let entry = self.tree.persisted(key, value)?;
        match self.tree.search(&entries, key) {
            Ok(index) => entries[index] = entry,
            Err(index) => entries.insert(index, entry),
        }
        Ok(())
    }

    fn remove(&mut self, key: &K) -> Result<bool, StorageError> {
        let mut entries = self.tree.lock();
        Ok(match self.tree.search(&entries, key) {
            Ok(index) => {
                entries.remove(index);
                true
            }
            Err(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{LongLayout, TestValue};

    struct KeepExisting;

    impl ValueMerger<i64, TestValue> for KeepExisting {
        fn merge(&mut self, _: &i64, _: &i64, _: &TestValue, _: &TestValue) -> MergeOutcome {
            MergeOutcome::Unchanged
        }
    }

    fn keys(seeker: &mut Seeker<'_, i64, TestValue>) -> Vec<i64> {
        let mut keys = Vec::new();
        while seeker.next().expect("next") {
            keys.push(*seeker.key());
        }
        keys
    }

    #[test]
    fn test_writes_and_seeks_in_key_order() {
        let tree: InMemoryTree<i64, TestValue> = InMemoryTree::new(Arc::new(LongLayout));
        let mut writer = tree.writer().expect("writer");
        for key in [5, 1, 9, 3] {
            writer.put(&key, &TestValue::from("v")).expect("put");
        }
        writer
            .merge(&3, &TestValue::from("other"), &mut KeepExisting)
            .expect("merge");
        assert!(writer.remove(&9).expect("remove"));
        assert!(!writer.remove(&9).expect("remove"));
        writer.close().expect("close");
        drop(writer);

        assert_eq!(tree.len(), 3);
        assert_eq!(
            tree.collect(|key, value| (*key, value.as_str().to_string())),
            vec![(1, "v".to_string()), (3, "v".to_string()), (5, "v".to_string())]
        );
        assert_eq!(keys(&mut tree.seek(&1, &5).expect("seek")), vec![1, 3]);
        assert_eq!(keys(&mut tree.seek(&3, &3).expect("seek")), vec![3]);
    }
}
