//! Packed key and value sizes in front of every entry.
//!
//! ```text
//! key byte:    [0][has value][more key][key size bits 0..5]
//! key byte 2:  key size bits 5..13                 (only if "more key")
//! value byte:  [more value][value size bits 0..7]  (only if "has value")
//! value byte 2: value size bits 7..15              (only if "more value")
//! ```
//!
//! Small keys without values therefore cost a single header byte.

use super::StorageError;
use super::cursor::{CursorError, ReadCursor, WriteCursor};

/// Largest key size the header can express.
pub const MAX_KEY_SIZE: usize = 0x1FFF;

/// Largest value size the header can express.
pub const MAX_VALUE_SIZE: usize = 0x7FFF;

const KEY_SIZE_MASK: u8 = 0x1F;
const FLAG_ADDITIONAL_KEY_SIZE: u8 = 0x20;
const FLAG_HAS_VALUE_SIZE: u8 = 0x40;
const KEY_SIZE_SHIFT: u32 = 5;

const VALUE_SIZE_MASK: u8 = 0x7F;
const FLAG_ADDITIONAL_VALUE_SIZE: u8 = 0x80;
const VALUE_SIZE_SHIFT: u32 = 7;

/// Bytes needed by the header for the given sizes.
#[must_use]
pub const fn header_size(key_size: usize, value_size: usize) -> usize {
    let key = if key_size > KEY_SIZE_MASK as usize { 2 } else { 1 };
    let value = if value_size == 0 {
        0
    } else if value_size > VALUE_SIZE_MASK as usize {
        2
    } else {
        1
    };
    key + value
}

/// Fail with [`StorageError::EntryTooLarge`] if the header cannot express
/// either size.
pub const fn check_key_value_size(key_size: usize, value_size: usize) -> Result<(), StorageError> {
    if key_size > MAX_KEY_SIZE {
        return Err(StorageError::EntryTooLarge {
            size: key_size,
            max: MAX_KEY_SIZE,
        });
    }
    if value_size > MAX_VALUE_SIZE {
        return Err(StorageError::EntryTooLarge {
            size: value_size,
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Write the header for an entry.
#[allow(clippy::cast_possible_truncation)] // sizes are range-checked first
pub fn put_key_value_size(
    cursor: &mut dyn WriteCursor,
    key_size: usize,
    value_size: usize,
) -> Result<(), StorageError> {
    check_key_value_size(key_size, value_size)?;

    let mut first = key_size as u8 & KEY_SIZE_MASK;
    let additional_key = key_size > KEY_SIZE_MASK as usize;
    if additional_key {
        first |= FLAG_ADDITIONAL_KEY_SIZE;
    }
    if value_size > 0 {
        first |= FLAG_HAS_VALUE_SIZE;
    }
    cursor.put_u8(first);
    if additional_key {
        cursor.put_u8((key_size >> KEY_SIZE_SHIFT) as u8);
    }

    if value_size > 0 {
        let mut value = value_size as u8 & VALUE_SIZE_MASK;
        let additional_value = value_size > VALUE_SIZE_MASK as usize;
        if additional_value {
            value |= FLAG_ADDITIONAL_VALUE_SIZE;
        }
        cursor.put_u8(value);
        if additional_value {
            cursor.put_u8((value_size >> VALUE_SIZE_SHIFT) as u8);
        }
    }
    Ok(())
}

/// Read a header written by [`put_key_value_size`].
pub fn read_key_value_size(cursor: &mut dyn ReadCursor) -> Result<(usize, usize), CursorError> {
    let first = cursor.get_u8()?;
    let mut key_size = usize::from(first & KEY_SIZE_MASK);
    if first & FLAG_ADDITIONAL_KEY_SIZE != 0 {
        key_size |= usize::from(cursor.get_u8()?) << KEY_SIZE_SHIFT;
    }

    let mut value_size = 0;
    if first & FLAG_HAS_VALUE_SIZE != 0 {
        let value = cursor.get_u8()?;
        value_size = usize::from(value & VALUE_SIZE_MASK);
        if value & FLAG_ADDITIONAL_VALUE_SIZE != 0 {
            value_size |= usize::from(cursor.get_u8()?) << VALUE_SIZE_SHIFT;
        }
    }
    Ok((key_size, value_size))
}
