//! Encoding of a single key/value entry.

use super::StorageError;
use super::cursor::{ReadCursor, WriteCursor};
use super::dynamic_size::{
    check_key_value_size, header_size, put_key_value_size, read_key_value_size,
};
use crate::key::Layout;

/// An owned key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry<K, V> {
    key: K,
    value: V,
}

impl<K, V> BlockEntry<K, V> {
    pub const fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    pub const fn key(&self) -> &K {
        &self.key
    }

    pub const fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    /// Deep copy of `key` and `value` through the layout.
    pub fn copied(layout: &dyn Layout<K, V>, key: &K, value: &V) -> Self {
        let mut entry = Self::new(layout.new_key(), layout.new_value());
        layout.copy_key(key, &mut entry.key);
        layout.copy_value(value, &mut entry.value);
        entry
    }

    /// Encoded size of a key/value entry. Fails if the entry cannot be
    /// written at all, so callers can reject it before touching storage.
    pub fn entry_size(
        layout: &dyn Layout<K, V>,
        key: &K,
        value: &V,
    ) -> Result<usize, StorageError> {
        let key_size = layout.key_size(key);
        let value_size = layout.value_size(value);
        check_key_value_size(key_size, value_size)?;
        Ok(header_size(key_size, value_size) + key_size + value_size)
    }

    /// Encoded size of a key-only entry.
    pub fn key_size(layout: &dyn Layout<K, V>, key: &K) -> Result<usize, StorageError> {
        let key_size = layout.key_size(key);
        check_key_value_size(key_size, 0)?;
        Ok(header_size(key_size, 0) + key_size)
    }

    pub fn write(
        cursor: &mut dyn WriteCursor,
        layout: &dyn Layout<K, V>,
        key: &K,
        value: &V,
    ) -> Result<(), StorageError> {
        put_key_value_size(cursor, layout.key_size(key), layout.value_size(value))?;
        layout.write_key(cursor, key);
        layout.write_value(cursor, value);
        Ok(())
    }

    pub fn write_key(
        cursor: &mut dyn WriteCursor,
        layout: &dyn Layout<K, V>,
        key: &K,
    ) -> Result<(), StorageError> {
        put_key_value_size(cursor, layout.key_size(key), 0)?;
        layout.write_key(cursor, key);
        Ok(())
    }

    /// Read a key/value entry into the given scratch key and value.
    pub fn read(
        cursor: &mut dyn ReadCursor,
        layout: &dyn Layout<K, V>,
        key: &mut K,
        value: &mut V,
    ) -> Result<(), StorageError> {
        let (key_size, value_size) = read_key_value_size(cursor)?;
        layout.read_key(cursor, key, key_size)?;
        layout.read_value(cursor, value, value_size)?;
        Ok(())
    }

    /// Read a key-only entry into the given scratch key.
    pub fn read_key(
        cursor: &mut dyn ReadCursor,
        layout: &dyn Layout<K, V>,
        key: &mut K,
    ) -> Result<(), StorageError> {
        let (key_size, value_size) = read_key_value_size(cursor)?;
        if value_size != 0 {
            return Err(StorageError::Corruption(format!(
                "key-only entry carries a value of {value_size} bytes"
            )));
        }
        layout.read_key(cursor, key, key_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cursor::SliceCursor;
    use crate::storage::dynamic_size::MAX_VALUE_SIZE;
    use crate::testing::{LongLayout, TestValue};

    type Entry = BlockEntry<i64, TestValue>;

    #[test]
    fn test_entries_read_back_in_order() {
        let layout = LongLayout;
        let mut buf: Vec<u8> = Vec::new();
        Entry::write(&mut buf, &layout, &3, &TestValue::from("three")).expect("write");
        Entry::write_key(&mut buf, &layout, &4).expect("write key");
        assert_eq!(
            buf.len(),
            Entry::entry_size(&layout, &3, &TestValue::from("three")).expect("size")
                + Entry::key_size(&layout, &4).expect("size")
        );

        let mut cursor = SliceCursor::new(&buf);
        let (mut key, mut value) = (0, TestValue::default());
        Entry::read(&mut cursor, &layout, &mut key, &mut value).expect("read");
        assert_eq!((key, value.as_str()), (3, "three"));
        Entry::read_key(&mut cursor, &layout, &mut key).expect("read key");
        assert_eq!(key, 4);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_key_only_read_rejects_value() {
        let layout = LongLayout;
        let mut buf: Vec<u8> = Vec::new();
        Entry::write(&mut buf, &layout, &1, &TestValue::from("v")).expect("write");
        let mut key = 0;
        assert!(matches!(
            Entry::read_key(&mut SliceCursor::new(&buf), &layout, &mut key),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_oversized_value_is_rejected_before_writing() {
        let layout = LongLayout;
        let value = TestValue::from("x".repeat(MAX_VALUE_SIZE + 1).as_str());
        assert!(matches!(
            Entry::entry_size(&layout, &1, &value),
            Err(StorageError::EntryTooLarge { max: MAX_VALUE_SIZE, .. })
        ));
        let mut buf: Vec<u8> = Vec::new();
        assert!(Entry::write(&mut buf, &layout, &1, &value).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_entry_is_corruption() {
        let layout = LongLayout;
        let mut buf: Vec<u8> = Vec::new();
        Entry::write(&mut buf, &layout, &1, &TestValue::from("value")).expect("write");
        buf.truncate(buf.len() - 2);
        let (mut key, mut value) = (0, TestValue::default());
        assert!(matches!(
            Entry::read(&mut SliceCursor::new(&buf), &layout, &mut key, &mut value),
            Err(StorageError::Corruption(_))
        ));
    }
}
