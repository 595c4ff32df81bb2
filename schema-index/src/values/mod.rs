//! Property values that can be indexed.
//!
//! Values are what callers hand to the index and what keys decode back into.
//! Every value belongs to exactly one [`ValueGroup`]; the key encoding maps
//! each group onto one on-disk [`Type`](crate::key::Type).
//!
//! # Design
//!
//! - Numbers keep their declared width (`Byte` .. `Double`) so a decoded key
//!   reproduces the exact value that was written.
//! - Text is carried as UTF-8 bytes behind an `Arc`, which lets a key hand out
//!   its internal buffer without copying (see [`TextValue`]).
//! - Temporal values and points are plain structs in their own modules.

mod spatial;
mod temporal;

use std::sync::Arc;

pub use spatial::{CoordinateReferenceSystem, PointValue, SpaceFillingCurve};
pub use temporal::{
    DateTimeValue, DateValue, DurationValue, LocalDateTimeValue, LocalTimeValue, NANOS_PER_DAY,
    TimeValue, TimeZone,
};

/// Category a value belongs to for indexing purposes.
///
/// The declaration order carries no meaning; cross-group ordering is decided
/// by the key type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueGroup {
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
    /// The absence of a value. Never indexable.
    NoValue,
    /// Stands for "any group" when initializing range bounds.
    Unknown,
}

/// UTF-8 text backed by a shared byte buffer.
///
/// The buffer may be longer than the text; only the first `len` bytes belong
/// to the value. Keys hand their internal buffer to a `TextValue` instead of
/// copying it and then stop writing into that buffer.
#[derive(Clone)]
#[allow(clippy::disallowed_methods)] // Clone shares the Arc, never the bytes
pub struct TextValue {
    buffer: Arc<Vec<u8>>,
    len: usize,
}

impl TextValue {
    /// Wrap a shared buffer whose first `len` bytes hold the text.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the buffer length.
    #[must_use]
    pub fn from_shared(buffer: Arc<Vec<u8>>, len: usize) -> Self {
        assert!(len <= buffer.len(), "text length beyond buffer");
        Self { buffer, len }
    }

    /// Raw UTF-8 bytes of the text.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Length of the text in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the text is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The text as `&str`, if the bytes are valid UTF-8.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    /// Whether this value shares its buffer with `other`.
    #[must_use]
    pub fn shares_buffer_with(&self, other: &Arc<Vec<u8>>) -> bool {
        Arc::ptr_eq(&self.buffer, other)
    }
}

impl From<&str> for TextValue {
    fn from(text: &str) -> Self {
        let bytes = text.as_bytes().to_vec();
        let len = bytes.len();
        Self {
            buffer: Arc::new(bytes),
            len,
        }
    }
}

impl PartialEq for TextValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl std::fmt::Debug for TextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed to report conflicting values
pub enum Value {
    NoValue,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(TextValue),
    Char(char),
    Boolean(bool),
    DateTime(DateTimeValue),
    LocalDateTime(LocalDateTimeValue),
    Date(DateValue),
    Time(TimeValue),
    LocalTime(LocalTimeValue),
    Duration(DurationValue),
    Point(PointValue),
    Array(ArrayValue),
}

impl Value {
    /// Convenience constructor for text values.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Text(TextValue::from(text))
    }

    /// The group this value belongs to.
    #[must_use]
    pub const fn value_group(&self) -> ValueGroup {
        match self {
            Self::NoValue => ValueGroup::NoValue,
            Self::Byte(_)
            | Self::Short(_)
            | Self::Int(_)
            | Self::Long(_)
            | Self::Float(_)
            | Self::Double(_) => ValueGroup::Number,
            Self::Text(_) | Self::Char(_) => ValueGroup::Text,
            Self::Boolean(_) => ValueGroup::Boolean,
            Self::DateTime(_) => ValueGroup::ZonedDateTime,
            Self::LocalDateTime(_) => ValueGroup::LocalDateTime,
            Self::Date(_) => ValueGroup::Date,
            Self::Time(_) => ValueGroup::ZonedTime,
            Self::LocalTime(_) => ValueGroup::LocalTime,
            Self::Duration(_) => ValueGroup::Duration,
            Self::Point(_) => ValueGroup::Geometry,
            Self::Array(array) => array.value_group(),
        }
    }
}

/// A homogeneous array of values.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed to report conflicting values
pub enum ArrayValue {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
    Char(Vec<char>),
    Boolean(Vec<bool>),
    DateTime(Vec<DateTimeValue>),
    LocalDateTime(Vec<LocalDateTimeValue>),
    Date(Vec<DateValue>),
    Time(Vec<TimeValue>),
    LocalTime(Vec<LocalTimeValue>),
    Duration(Vec<DurationValue>),
    Point(Vec<PointValue>),
}

impl ArrayValue {
    /// The group this array belongs to.
    #[must_use]
    pub const fn value_group(&self) -> ValueGroup {
        match self {
            Self::Byte(_)
            | Self::Short(_)
            | Self::Int(_)
            | Self::Long(_)
            | Self::Float(_)
            | Self::Double(_) => ValueGroup::NumberArray,
            Self::Text(_) | Self::Char(_) => ValueGroup::TextArray,
            Self::Boolean(_) => ValueGroup::BooleanArray,
            Self::DateTime(_) => ValueGroup::ZonedDateTimeArray,
            Self::LocalDateTime(_) => ValueGroup::LocalDateTimeArray,
            Self::Date(_) => ValueGroup::DateArray,
            Self::Time(_) => ValueGroup::ZonedTimeArray,
            Self::LocalTime(_) => ValueGroup::LocalTimeArray,
            Self::Duration(_) => ValueGroup::DurationArray,
            Self::Point(_) => ValueGroup::GeometryArray,
        }
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::Boolean(v) => v.len(),
            Self::DateTime(v) => v.len(),
            Self::LocalDateTime(v) => v.len(),
            Self::Date(v) => v.len(),
            Self::Time(v) => v.len(),
            Self::LocalTime(v) => v.len(),
            Self::Duration(v) => v.len(),
            Self::Point(v) => v.len(),
        }
    }

    /// Whether the array has no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
