//! Sortable binary keys for property values.
//!
//! A [`GenericKey`] holds one [`KeyState`] per indexed property plus the id of
//! the entity that owns the values. Each slot encodes one value of any
//! supported [`Type`]; slots compare lexicographically, and the entity id is
//! the final tie-break when both keys ask for it.
//!
//! # Key Format
//!
//! ```text
//! [type id: 1 byte][payload]   repeated once per slot
//! [entity id: 8 bytes]
//! ```
//!
//! Payload layouts are listed on [`Type`]. All integers are little-endian.
//!
//! # Invariants
//!
//! - Every slot is exactly one of: uninitialized, a scalar, an array, the
//!   lowest sentinel or the highest sentinel of a type.
//! - For any two keys `a` and `b` of the same slot count, `compare` is a total
//!   order, and encoding then decoding preserves it.
//! - Keys are reusable scratch objects: buffers only grow, and a key never
//!   writes into a text buffer it has handed out through `as_value`.

mod codec;
mod compare;
mod generic_key;
mod layout;
mod number;
mod state;
mod types;
mod validator;

pub use generic_key::GenericKey;
pub use layout::{GenericLayout, KeyComparator, Layout, NullValue};
pub use number::NumberType;
pub use state::KeyState;
pub use types::Type;
pub use validator::GenericKeyValidator;

use crate::storage::cursor::CursorError;

/// Size of the entity id appended to every key.
pub const ENTITY_ID_SIZE: usize = 8;

/// Size of the type id written before every slot.
pub const TYPE_ID_SIZE: usize = 1;

/// How a key compares against keys with an equal value.
///
/// Used to build inclusive and exclusive range bounds: a `Low` bound sorts
/// before every key carrying the same value, a `High` bound after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Inclusion {
    Low,
    Neutral,
    High,
}

/// Errors that can occur while building, encoding or decoding keys.
#[derive(Debug)]
pub enum KeyError {
    /// Slot index outside the key's slot count.
    SlotOutOfRange { slot: usize, slots: usize },
    /// The value cannot be stored in a key.
    UnsupportedValue(String),
    /// Encoded key data is malformed.
    Corruption(String),
    /// The encoded key would exceed the maximum key size.
    ValueTooLarge {
        entity_id: i64,
        size: usize,
        max: usize,
    },
    /// Cursor error while reading key data.
    Cursor(CursorError),
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlotOutOfRange { slot, slots } => {
                write!(f, "slot {slot} out of range (key has {slots} slots)")
            }
            Self::UnsupportedValue(msg) => write!(f, "unsupported value: {msg}"),
            Self::Corruption(msg) => write!(f, "corrupt key: {msg}"),
            Self::ValueTooLarge {
                entity_id,
                size,
                max,
            } => write!(
                f,
                "property value is too large to index: entity id {entity_id}, size {size}, max size {max}"
            ),
            Self::Cursor(e) => write!(f, "cursor error: {e}"),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cursor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CursorError> for KeyError {
    fn from(e: CursorError) -> Self {
        Self::Cursor(e)
    }
}
