//! The closed registry of key types.
//!
//! Every value group maps to one [`Type`]. A type has two independent
//! numberings:
//!
//! - the **type id**, a stable byte written before each slot on disk;
//! - the **rank**, which orders keys of different types against each other.
//!
//! The two differ on purpose: type ids are fixed by the on-disk format, while
//! ranks follow the cross-type ordering of values. Ranks run in declaration
//! order: numbers, text, booleans, the temporal kinds, durations, points, and
//! then the array form of each in the same order.
//!
//! # Payloads
//!
//! | type | payload |
//! |---|---|
//! | `Number` | number type byte, then 1/2/4/8 raw bytes |
//! | `Text` | u16 (bit 15 char flag, bits 0..14 length), UTF-8 bytes |
//! | `Boolean` | 1 byte |
//! | `ZonedDateTime` | i64 epoch second, i32 nano, i32 encoded zone |
//! | `LocalDateTime` | i64 epoch second, i32 nano |
//! | `Date` | i64 epoch day |
//! | `ZonedTime` | i64 UTC nanos of day, i32 offset seconds |
//! | `LocalTime` | i64 nano of day |
//! | `Duration` | i64 average seconds, i32 nanos, i64 months, i64 days |
//! | `Geometry` | i32 CRS header, i64 curve value, one f64 per coordinate |
//!
//! Arrays write a u16 header (bit 15 char flag for text arrays, bits 0..14
//! element count) followed by the elements. Number arrays put the number type
//! byte before the header, geometry arrays the CRS header.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::values::ValueGroup;

/// A key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Number,
    Text,
    Boolean,
    ZonedDateTime,
    LocalDateTime,
    Date,
    ZonedTime,
    LocalTime,
    Duration,
    Geometry,
    NumberArray,
    TextArray,
    BooleanArray,
    ZonedDateTimeArray,
    LocalDateTimeArray,
    DateArray,
    ZonedTimeArray,
    LocalTimeArray,
    DurationArray,
    GeometryArray,
}

static TYPE_BY_ID: LazyLock<[Option<Type>; 256]> = LazyLock::new(|| {
    let mut by_id = [None; 256];
    for ty in Type::ALL {
        by_id[usize::from(ty.type_id())] = Some(ty);
    }
    by_id
});

static TYPE_BY_GROUP: LazyLock<HashMap<ValueGroup, Type>> =
    LazyLock::new(|| Type::ALL.into_iter().map(|ty| (ty.value_group(), ty)).collect());

impl Type {
    /// All types, in rank order.
    pub const ALL: [Self; 20] = [
        Self::Number,
        Self::Text,
        Self::Boolean,
        Self::ZonedDateTime,
        Self::LocalDateTime,
        Self::Date,
        Self::ZonedTime,
        Self::LocalTime,
        Self::Duration,
        Self::Geometry,
        Self::NumberArray,
        Self::TextArray,
        Self::BooleanArray,
        Self::ZonedDateTimeArray,
        Self::LocalDateTimeArray,
        Self::DateArray,
        Self::ZonedTimeArray,
        Self::LocalTimeArray,
        Self::DurationArray,
        Self::GeometryArray,
    ];

    /// Stable on-disk id.
    #[must_use]
    pub const fn type_id(self) -> u8 {
        match self {
            Self::ZonedDateTime => 0,
            Self::LocalDateTime => 1,
            Self::Date => 2,
            Self::ZonedTime => 3,
            Self::LocalTime => 4,
            Self::Duration => 5,
            Self::Text => 6,
            Self::Boolean => 7,
            Self::Number => 8,
            Self::ZonedDateTimeArray => 9,
            Self::LocalDateTimeArray => 10,
            Self::DateArray => 11,
            Self::ZonedTimeArray => 12,
            Self::LocalTimeArray => 13,
            Self::DurationArray => 14,
            Self::TextArray => 15,
            Self::BooleanArray => 16,
            Self::NumberArray => 17,
            Self::Geometry => 18,
            Self::GeometryArray => 19,
        }
    }

    /// Position in the cross-type order.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Look up a type by its on-disk id.
    #[must_use]
    pub fn from_type_id(id: u8) -> Option<Self> {
        TYPE_BY_ID[usize::from(id)]
    }

    /// Look up the type storing values of `group`.
    ///
    /// Returns `None` for [`ValueGroup::NoValue`] and [`ValueGroup::Unknown`].
    #[must_use]
    pub fn from_value_group(group: ValueGroup) -> Option<Self> {
        TYPE_BY_GROUP.get(&group).copied()
    }

    /// The value group stored by this type.
    #[must_use]
    pub const fn value_group(self) -> ValueGroup {
        match self {
            Self::Number => ValueGroup::Number,
            Self::Text => ValueGroup::Text,
            Self::Boolean => ValueGroup::Boolean,
            Self::ZonedDateTime => ValueGroup::ZonedDateTime,
            Self::LocalDateTime => ValueGroup::LocalDateTime,
            Self::Date => ValueGroup::Date,
            Self::ZonedTime => ValueGroup::ZonedTime,
            Self::LocalTime => ValueGroup::LocalTime,
            Self::Duration => ValueGroup::Duration,
            Self::Geometry => ValueGroup::Geometry,
            Self::NumberArray => ValueGroup::NumberArray,
            Self::TextArray => ValueGroup::TextArray,
            Self::BooleanArray => ValueGroup::BooleanArray,
            Self::ZonedDateTimeArray => ValueGroup::ZonedDateTimeArray,
            Self::LocalDateTimeArray => ValueGroup::LocalDateTimeArray,
            Self::DateArray => ValueGroup::DateArray,
            Self::ZonedTimeArray => ValueGroup::ZonedTimeArray,
            Self::LocalTimeArray => ValueGroup::LocalTimeArray,
            Self::DurationArray => ValueGroup::DurationArray,
            Self::GeometryArray => ValueGroup::GeometryArray,
        }
    }

    /// Whether this is an array type.
    #[must_use]
    pub const fn is_array(self) -> bool {
        self.rank() >= Self::NumberArray.rank()
    }

    /// The scalar type of an array type's elements.
    #[must_use]
    pub const fn element_type(self) -> Option<Self> {
        match self {
            Self::NumberArray => Some(Self::Number),
            Self::TextArray => Some(Self::Text),
            Self::BooleanArray => Some(Self::Boolean),
            Self::ZonedDateTimeArray => Some(Self::ZonedDateTime),
            Self::LocalDateTimeArray => Some(Self::LocalDateTime),
            Self::DateArray => Some(Self::Date),
            Self::ZonedTimeArray => Some(Self::ZonedTime),
            Self::LocalTimeArray => Some(Self::LocalTime),
            Self::DurationArray => Some(Self::Duration),
            Self::GeometryArray => Some(Self::Geometry),
            _ => None,
        }
    }

    /// The type with the lowest rank.
    #[must_use]
    pub const fn lowest() -> Self {
        Self::ALL[0]
    }

    /// The type with the highest rank.
    #[must_use]
    pub const fn highest() -> Self {
        Self::ALL[Self::ALL.len() - 1]
    }
}
