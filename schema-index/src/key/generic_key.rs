//! Composite keys.
//!
//! A [`GenericKey`] is a fixed number of [`KeyState`] slots plus an entity id.
//! Keys are mutable scratch objects: storages and mergers keep a few of them
//! and overwrite them in place with [`copy_from`](GenericKey::copy_from) and
//! [`read`](GenericKey::read) instead of allocating per entry.

use std::cmp::Ordering;

use super::state::KeyState;
use super::{ENTITY_ID_SIZE, Inclusion, KeyError};
use crate::storage::cursor::{ReadCursor, WriteCursor};
use crate::values::{Value, ValueGroup};

/// Entity id of a key that sorts before every real key with equal values.
pub const LOWEST_ENTITY_ID: i64 = i64::MIN;

/// Entity id of a key that sorts after every real key with equal values.
pub const HIGHEST_ENTITY_ID: i64 = i64::MAX;

/// A key of one or more value slots.
#[derive(Debug)]
pub struct GenericKey {
    slots: Vec<KeyState>,
    entity_id: i64,
    compare_id: bool,
}

impl GenericKey {
    /// Create a key with `number_of_slots` uninitialized slots.
    ///
    /// # Panics
    ///
    /// Panics if `number_of_slots` is zero.
    #[must_use]
    pub fn new(number_of_slots: usize) -> Self {
        assert!(number_of_slots > 0, "a key needs at least one slot");
        Self {
            slots: (0..number_of_slots).map(|_| KeyState::new()).collect(),
            entity_id: 0,
            compare_id: true,
        }
    }

    /// Number of value slots.
    #[must_use]
    pub fn number_of_slots(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn entity_id(&self) -> i64 {
        self.entity_id
    }

    pub const fn set_entity_id(&mut self, entity_id: i64) {
        self.entity_id = entity_id;
    }

    /// Whether equal-valued keys are told apart by entity id.
    #[must_use]
    pub const fn compare_id(&self) -> bool {
        self.compare_id
    }

    pub const fn set_compare_id(&mut self, compare_id: bool) {
        self.compare_id = compare_id;
    }

    /// Reset every slot and set the entity id.
    pub fn initialize(&mut self, entity_id: i64) {
        for slot in &mut self.slots {
            slot.clear();
        }
        self.entity_id = entity_id;
        self.compare_id = true;
    }

    /// Get a slot.
    pub fn slot(&self, slot: usize) -> Result<&KeyState, KeyError> {
        let slots = self.slots.len();
        self.slots
            .get(slot)
            .ok_or(KeyError::SlotOutOfRange { slot, slots })
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut KeyState, KeyError> {
        let slots = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or(KeyError::SlotOutOfRange { slot, slots })
    }

    /// Write `value` into `slot`.
    pub fn write_value(
        &mut self,
        slot: usize,
        value: &Value,
        inclusion: Inclusion,
    ) -> Result<(), KeyError> {
        self.slot_mut(slot)?.write_value(value, inclusion)
    }

    /// Initialize `slot` to sort before every value of `group`.
    pub fn init_value_as_lowest(&mut self, slot: usize, group: ValueGroup) -> Result<(), KeyError> {
        self.slot_mut(slot)?.init_as_lowest(group);
        Ok(())
    }

    /// Initialize `slot` to sort after every value of `group`.
    pub fn init_value_as_highest(
        &mut self,
        slot: usize,
        group: ValueGroup,
    ) -> Result<(), KeyError> {
        self.slot_mut(slot)?.init_as_highest(group);
        Ok(())
    }

    /// Initialize `slot` as the low bound of a prefix search.
    pub fn init_as_prefix_low(&mut self, slot: usize, prefix: &str) -> Result<(), KeyError> {
        self.slot_mut(slot)?.init_as_prefix_low(prefix);
        Ok(())
    }

    /// Initialize `slot` as the high bound of a prefix search.
    pub fn init_as_prefix_high(&mut self, slot: usize, prefix: &str) -> Result<(), KeyError> {
        self.slot_mut(slot)?.init_as_prefix_high(prefix);
        Ok(())
    }

    /// Make this the lowest possible key: every slot lowest, lowest entity id.
    pub fn init_as_lowest(&mut self) {
        for slot in &mut self.slots {
            slot.init_as_lowest(ValueGroup::Unknown);
        }
        self.entity_id = LOWEST_ENTITY_ID;
        self.compare_id = true;
    }

    /// Make this the highest possible key: every slot highest, highest entity
    /// id.
    pub fn init_as_highest(&mut self) {
        for slot in &mut self.slots {
            slot.init_as_highest(ValueGroup::Unknown);
        }
        self.entity_id = HIGHEST_ENTITY_ID;
        self.compare_id = true;
    }

    /// Initialize from an entity id and one value per slot.
    pub fn write_values(&mut self, entity_id: i64, values: &[Value]) -> Result<(), KeyError> {
        if values.len() != self.slots.len() {
            return Err(KeyError::SlotOutOfRange {
                slot: values.len(),
                slots: self.slots.len(),
            });
        }
        self.initialize(entity_id);
        for (slot, value) in self.slots.iter_mut().zip(values) {
            slot.write_value(value, Inclusion::Neutral)?;
        }
        Ok(())
    }

    /// Deep copy `other` into this key.
    ///
    /// # Panics
    ///
    /// Panics if the slot counts differ.
    pub fn copy_from(&mut self, other: &Self) {
        assert_eq!(self.slots.len(), other.slots.len(), "slot count mismatch");
        for (into, from) in self.slots.iter_mut().zip(&other.slots) {
            into.copy_from(from);
        }
        self.entity_id = other.entity_id;
        self.compare_id = other.compare_id;
    }

    /// Compare slot by slot, ignoring entity ids.
    #[must_use]
    pub fn compare_value_to(&self, other: &Self) -> Ordering {
        self.slots
            .iter()
            .zip(&other.slots)
            .map(|(lhs, rhs)| lhs.compare_value_to(rhs))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.slots.len().cmp(&other.slots.len()))
    }

    /// Full key order: values, then entity id when both keys compare ids.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match self.compare_value_to(other) {
            Ordering::Equal if self.compare_id && other.compare_id => {
                self.entity_id.cmp(&other.entity_id)
            }
            ordering => ordering,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.iter().map(KeyState::size).sum::<usize>() + ENTITY_ID_SIZE
    }

    /// Write all slots followed by the entity id.
    pub fn put(&self, cursor: &mut dyn WriteCursor) {
        for slot in &self.slots {
            slot.put(cursor);
        }
        cursor.put_i64(self.entity_id);
    }

    /// Read a key of exactly `key_size` bytes.
    pub fn read(&mut self, cursor: &mut dyn ReadCursor, key_size: usize) -> Result<(), KeyError> {
        let Some(mut remaining) = key_size.checked_sub(ENTITY_ID_SIZE) else {
            return Err(KeyError::Corruption(format!("key size {key_size} too small")));
        };
        for slot in &mut self.slots {
            remaining -= slot.read(cursor, remaining)?;
        }
        if remaining != 0 {
            return Err(KeyError::Corruption(format!(
                "{remaining} unread bytes in key of size {key_size}"
            )));
        }
        self.entity_id = cursor.get_i64()?;
        self.compare_id = true;
        Ok(())
    }

    /// Decode every slot.
    pub fn as_values(&mut self) -> Result<Vec<Value>, KeyError> {
        self.slots.iter_mut().map(KeyState::as_value).collect()
    }

    /// Compute a short key `into` with `left < into <= right`.
    ///
    /// Slots before the first differing slot are copied from `right`; that slot
    /// and every later one get their per-type minimal splitter.
    pub fn minimal_splitter(left: &Self, right: &Self, into: &mut Self) {
        let slot_count = right.slots.len();
        let first_to_differ = left
            .slots
            .iter()
            .zip(&right.slots)
            .position(|(l, r)| l.compare_value_to(r).is_ne())
            .unwrap_or(slot_count - 1);
        for i in 0..first_to_differ {
            into.slots[i].copy_from(&right.slots[i]);
        }
        for i in first_to_differ..slot_count {
            KeyState::minimal_splitter(&left.slots[i], &right.slots[i], &mut into.slots[i]);
        }
        into.entity_id = right.entity_id;
        into.compare_id = right.compare_id;
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::storage::cursor::SliceCursor;
    use crate::testing::random_value;

    fn key(entity_id: i64, values: &[Value]) -> GenericKey {
        let mut key = GenericKey::new(values.len());
        key.write_values(entity_id, values).expect("write values");
        key
    }

    fn roundtrip(key: &GenericKey) -> GenericKey {
        let mut buf: Vec<u8> = Vec::new();
        key.put(&mut buf);
        assert_eq!(buf.len(), key.size());
        let mut read = GenericKey::new(key.number_of_slots());
        read.read(&mut SliceCursor::new(&buf), buf.len())
            .expect("read key");
        read
    }

    #[test]
    fn test_composite_keys_order_lexicographically() {
        let a = key(1, &[Value::Int(1), Value::text("z")]);
        let b = key(2, &[Value::Int(2), Value::text("a")]);
        let c = key(3, &[Value::Int(2), Value::text("b")]);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&c), Ordering::Less);
    }

    #[test]
    fn test_entity_id_breaks_ties_only_when_both_compare_ids() {
        let mut a = key(1, &[Value::Int(5)]);
        let b = key(2, &[Value::Int(5)]);
        assert_eq!(a.compare(&b), Ordering::Less);

        a.set_compare_id(false);
        assert_eq!(a.compare(&b), Ordering::Equal);
        assert_eq!(b.compare(&a), Ordering::Equal);
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut key = GenericKey::new(2);
        assert!(matches!(
            key.write_value(2, &Value::Int(1), Inclusion::Neutral),
            Err(KeyError::SlotOutOfRange { slot: 2, slots: 2 })
        ));
        assert!(key.init_value_as_lowest(5, ValueGroup::Text).is_err());
    }

    #[test]
    fn test_roundtrip_preserves_order_and_values() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let keys: Vec<GenericKey> = (0..300)
            .map(|i| {
                let values = [random_value(&mut rng), random_value(&mut rng)];
                key(i, &values)
            })
            .collect();

        for pair in keys.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (ra, rb) = (roundtrip(a), roundtrip(b));
            assert_eq!(ra.compare(&rb), a.compare(b));
            assert_eq!(ra.compare(a), Ordering::Equal);
        }

        for original in &keys {
            let mut expected = GenericKey::new(2);
            expected.copy_from(original);
            let mut read = roundtrip(original);
            assert_eq!(
                read.as_values().expect("values"),
                expected.as_values().expect("values")
            );
            assert_eq!(read.entity_id(), original.entity_id());
        }
    }

    #[test]
    fn test_compare_is_a_total_order() {
        let mut rng = StdRng::seed_from_u64(42);
        let keys: Vec<GenericKey> = (0..60)
            .map(|i| key(i % 7, &[random_value(&mut rng)]))
            .collect();

        for a in &keys {
            assert_eq!(a.compare(a), Ordering::Equal);
            for b in &keys {
                assert_eq!(a.compare(b), b.compare(a).reverse());
                for c in &keys {
                    if a.compare(b).is_le() && b.compare(c).is_le() {
                        assert!(a.compare(c).is_le(), "{a:?} {b:?} {c:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_sentinels_bound_every_key() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut lowest = GenericKey::new(2);
        lowest.init_as_lowest();
        let mut highest = GenericKey::new(2);
        highest.init_as_highest();

        for i in 0..500 {
            let k = key(i, &[random_value(&mut rng), random_value(&mut rng)]);
            assert_eq!(lowest.compare(&k), Ordering::Less, "{k:?}");
            assert_eq!(highest.compare(&k), Ordering::Greater, "{k:?}");
        }
    }

    #[test]
    fn test_group_sentinels_bound_values_of_the_group() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let value = random_value(&mut rng);
            let group = value.value_group();
            let k = key(0, &[value]);

            let mut low = GenericKey::new(1);
            low.init_value_as_lowest(0, group).expect("lowest");
            let mut high = GenericKey::new(1);
            high.init_value_as_highest(0, group).expect("highest");

            assert_eq!(low.compare_value_to(&k), Ordering::Less, "{k:?}");
            assert_eq!(high.compare_value_to(&k), Ordering::Greater, "{k:?}");
        }
    }

    #[test]
    fn test_minimal_splitter_separates_keys() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut into = GenericKey::new(2);
        for i in 0..500 {
            let a = key(i, &[random_value(&mut rng), random_value(&mut rng)]);
            let b = key(i + 1, &[random_value(&mut rng), random_value(&mut rng)]);
            let (left, right) = if a.compare(&b).is_lt() { (a, b) } else { (b, a) };

            GenericKey::minimal_splitter(&left, &right, &mut into);
            assert_eq!(left.compare(&into), Ordering::Less, "{left:?} {into:?}");
            assert!(into.compare(&right).is_le(), "{into:?} {right:?}");
            assert!(into.size() <= right.size());
        }
    }

    #[test]
    fn test_minimal_splitter_shortens_text() {
        let left = key(1, &[Value::text("apple")]);
        let right = key(2, &[Value::text("banana")]);
        let mut into = GenericKey::new(1);
        GenericKey::minimal_splitter(&left, &right, &mut into);
        assert_eq!(into.as_values().expect("values"), vec![Value::text("b")]);
        assert_eq!(into.entity_id(), 2);
    }

    #[test]
    fn test_read_rejects_wrong_key_size() {
        let k = key(3, &[Value::Int(1)]);
        let mut buf: Vec<u8> = Vec::new();
        k.put(&mut buf);
        buf.extend_from_slice(&[0; 4]);
        let mut read = GenericKey::new(1);
        assert!(matches!(
            read.read(&mut SliceCursor::new(&buf), buf.len()),
            Err(KeyError::Corruption(_))
        ));
    }
}
