//! Size check for values about to be indexed.
//!
//! Encoding a key only to measure it is wasted work for the common case of
//! small values, so [`GenericKeyValidator`] first computes a cheap upper bound
//! from the values alone and only encodes when that bound exceeds the limit.
//! The bound never underestimates, so the quick path cannot accept a value
//! that is actually too large.

use super::codec::BIGGEST_STATIC_SIZE;
use super::generic_key::GenericKey;
use super::{ENTITY_ID_SIZE, KeyError, TYPE_ID_SIZE};
use crate::values::{ArrayValue, Value};

const SIZE_LENGTH_HEADER: usize = 2;
const ARRAY_OVERHEAD: usize = 8;

/// Rejects value tuples whose key would exceed `max_key_size` bytes.
#[derive(Debug, Clone, Copy)]
pub struct GenericKeyValidator {
    number_of_slots: usize,
    max_key_size: usize,
}

impl GenericKeyValidator {
    #[must_use]
    pub const fn new(number_of_slots: usize, max_key_size: usize) -> Self {
        Self {
            number_of_slots,
            max_key_size,
        }
    }

    #[must_use]
    pub const fn max_key_size(&self) -> usize {
        self.max_key_size
    }

    /// Check that the key for `values` fits.
    pub fn validate(&self, entity_id: i64, values: &[Value]) -> Result<(), KeyError> {
        if worst_case_key_size(values) <= self.max_key_size {
            return Ok(());
        }
        let mut key = GenericKey::new(self.number_of_slots.max(1));
        key.write_values(entity_id, values)?;
        let size = key.size();
        if size > self.max_key_size {
            return Err(KeyError::ValueTooLarge {
                entity_id,
                size,
                max: self.max_key_size,
            });
        }
        Ok(())
    }
}

/// Upper bound of the encoded key size for `values`.
#[must_use]
pub fn worst_case_key_size(values: &[Value]) -> usize {
    ENTITY_ID_SIZE + values.iter().map(worst_case_value_size).sum::<usize>()
}

fn worst_case_value_size(value: &Value) -> usize {
    match value {
        Value::Text(text) => TYPE_ID_SIZE + SIZE_LENGTH_HEADER + text.len(),
        Value::Array(ArrayValue::Text(elements)) => {
            TYPE_ID_SIZE
                + SIZE_LENGTH_HEADER
                + elements
                    .iter()
                    .map(|element| SIZE_LENGTH_HEADER + element.len())
                    .sum::<usize>()
        }
        Value::Array(array) => ARRAY_OVERHEAD + array.len() * BIGGEST_STATIC_SIZE,
        _ => BIGGEST_STATIC_SIZE,
    }
}
