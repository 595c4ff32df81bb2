//! Key/value layout: how a storage creates, copies, sizes, encodes and orders
//! its entries.
//!
//! Storages and mergers are generic over a [`Layout`] so that the same block
//! and merge machinery serves composite [`GenericKey`]s as well as simple test
//! keys.

use std::cmp::Ordering;
use std::sync::Arc;

use super::KeyError;
use super::generic_key::GenericKey;
use crate::storage::cursor::{ReadCursor, WriteCursor};

/// Shared ordering over keys, used where a layout is not at hand.
pub type KeyComparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

/// Operations a storage needs on its keys and values.
pub trait Layout<K, V>: Send + Sync {
    fn new_key(&self) -> K;

    fn new_value(&self) -> V;

    fn copy_key(&self, from: &K, into: &mut K);

    fn copy_value(&self, from: &V, into: &mut V);

    fn key_size(&self, key: &K) -> usize;

    fn value_size(&self, value: &V) -> usize;

    fn write_key(&self, cursor: &mut dyn WriteCursor, key: &K);

    fn write_value(&self, cursor: &mut dyn WriteCursor, value: &V);

    /// Read a key encoded in exactly `key_size` bytes.
    fn read_key(
        &self,
        cursor: &mut dyn ReadCursor,
        into: &mut K,
        key_size: usize,
    ) -> Result<(), KeyError>;

    /// Read a value encoded in exactly `value_size` bytes.
    fn read_value(
        &self,
        cursor: &mut dyn ReadCursor,
        into: &mut V,
        value_size: usize,
    ) -> Result<(), KeyError>;

    /// Full key order, including any entity id tie-break.
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering;

    /// Order on the indexed values only. Keys equal here belong to the same
    /// distinct value when sampling.
    fn compare_value(&self, lhs: &K, rhs: &K) -> Ordering {
        self.compare(lhs, rhs)
    }

    /// Shortest key `into` with `left < into <= right`.
    fn minimal_splitter(&self, left: &K, right: &K, into: &mut K) {
        let _ = left;
        self.copy_key(right, into);
    }

    /// Whether every key and value encodes to the same size.
    fn fixed_size(&self) -> bool {
        false
    }
}

/// The value of an index entry: indexes store keys only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullValue;

/// Layout of composite [`GenericKey`]s with [`NullValue`] values.
#[derive(Debug, Clone, Copy)]
pub struct GenericLayout {
    number_of_slots: usize,
}

impl GenericLayout {
    /// # Panics
    ///
    /// Panics if `number_of_slots` is zero.
    #[must_use]
    pub fn new(number_of_slots: usize) -> Self {
        assert!(number_of_slots > 0, "a key needs at least one slot");
        Self { number_of_slots }
    }

    #[must_use]
    pub const fn number_of_slots(&self) -> usize {
        self.number_of_slots
    }

    /// Comparator over the values of keys, ignoring entity ids.
    #[must_use]
    pub fn value_comparator() -> KeyComparator<GenericKey> {
        Arc::new(|lhs: &GenericKey, rhs: &GenericKey| lhs.compare_value_to(rhs))
    }
}

impl Layout<GenericKey, NullValue> for GenericLayout {
    fn new_key(&self) -> GenericKey {
        GenericKey::new(self.number_of_slots)
    }

    fn new_value(&self) -> NullValue {
        NullValue
    }

    fn copy_key(&self, from: &GenericKey, into: &mut GenericKey) {
        into.copy_from(from);
    }

    fn copy_value(&self, _from: &NullValue, _into: &mut NullValue) {}

    fn key_size(&self, key: &GenericKey) -> usize {
        key.size()
    }

    fn value_size(&self, _value: &NullValue) -> usize {
        0
    }

    fn write_key(&self, cursor: &mut dyn WriteCursor, key: &GenericKey) {
        key.put(cursor);
    }

    fn write_value(&self, _cursor: &mut dyn WriteCursor, _value: &NullValue) {}

    fn read_key(
        &self,
        cursor: &mut dyn ReadCursor,
        into: &mut GenericKey,
        key_size: usize,
    ) -> Result<(), KeyError> {
        into.read(cursor, key_size)
    }

    fn read_value(
        &self,
        _cursor: &mut dyn ReadCursor,
        _into: &mut NullValue,
        value_size: usize,
    ) -> Result<(), KeyError> {
        if value_size == 0 {
            Ok(())
        } else {
            Err(KeyError::Corruption(format!(
                "unexpected value of {value_size} bytes"
            )))
        }
    }

    fn compare(&self, lhs: &GenericKey, rhs: &GenericKey) -> Ordering {
        lhs.compare(rhs)
    }

    fn compare_value(&self, lhs: &GenericKey, rhs: &GenericKey) -> Ordering {
        lhs.compare_value_to(rhs)
    }

    fn minimal_splitter(&self, left: &GenericKey, right: &GenericKey, into: &mut GenericKey) {
        GenericKey::minimal_splitter(left, right, into);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Inclusion;
    use crate::storage::cursor::SliceCursor;
    use crate::values::Value;

    #[test]
    fn test_generic_layout_roundtrip() {
        let layout = GenericLayout::new(2);
        let mut key = layout.new_key();
        key.initialize(9);
        key.write_value(0, &Value::text("x"), Inclusion::Neutral)
            .expect("write");
        key.write_value(1, &Value::Boolean(true), Inclusion::Neutral)
            .expect("write");

        let mut buf: Vec<u8> = Vec::new();
        layout.write_key(&mut buf, &key);
        layout.write_value(&mut buf, &NullValue);
        assert_eq!(buf.len(), layout.key_size(&key));

        let mut read = layout.new_key();
        let mut cursor = SliceCursor::new(&buf);
        layout
            .read_key(&mut cursor, &mut read, buf.len())
            .expect("read key");
        let mut value = layout.new_value();
        layout
            .read_value(&mut cursor, &mut value, 0)
            .expect("read value");
        assert_eq!(layout.compare(&key, &read), Ordering::Equal);
    }

    #[test]
    fn test_value_comparator_ignores_entity_id() {
        let layout = GenericLayout::new(1);
        let mut a = layout.new_key();
        a.write_values(1, &[Value::Int(3)]).expect("write");
        let mut b = layout.new_key();
        b.write_values(2, &[Value::Int(3)]).expect("write");

        assert_eq!(layout.compare(&a, &b), Ordering::Less);
        assert_eq!(layout.compare_value(&a, &b), Ordering::Equal);
        assert_eq!(GenericLayout::value_comparator()(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_null_value_rejects_payload() {
        let layout = GenericLayout::new(1);
        let mut value = NullValue;
        let mut cursor = SliceCursor::new(&[1, 2]);
        assert!(layout.read_value(&mut cursor, &mut value, 2).is_err());
    }
}
