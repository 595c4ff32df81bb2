//! A single key slot.
//!
//! [`KeyState`] is a union of all value kinds laid out as plain fields, so one
//! scratch object can be rewritten with any value without allocating. Which
//! fields are meaningful depends on the slot's [`Type`]:
//!
//! | type | fields |
//! |---|---|
//! | `Number` | `long0` raw bits, `long1` number type |
//! | `Text` | `bytes[..bytes_length]`, `is_char`, `ignore_length`, `is_highest_text` |
//! | `Boolean` | `long0` (0 or 1) |
//! | `ZonedDateTime` | `long0` epoch second, `long1` nano, `long2` region id or -1, `long3` offset seconds |
//! | `LocalDateTime` | `long0` nano, `long1` epoch second |
//! | `Date` | `long0` epoch day |
//! | `ZonedTime` | `long0` UTC nanos of day, `long1` offset seconds |
//! | `LocalTime` | `long0` nano of day |
//! | `Duration` | `long0` average seconds, `long1` nanos, `long2` months, `long3` days |
//! | `Geometry` | `long0` curve value, `long1` CRS table, `long2` CRS code, `long3` dimension, `doubles` coordinates |
//!
//! Arrays use the `*_array` fields with the same per-element meaning, the
//! first `array_length` entries being valid. Number arrays keep the number
//! type in `long1`; geometry arrays keep the CRS in `long1..long3` and the
//! flattened coordinates in `doubles`.
//!
//! # Invariants
//!
//! - Buffers only grow.
//! - After [`as_value`](KeyState::as_value) hands out the text buffer, the
//!   next text write allocates a fresh one.

use std::sync::Arc;

use super::number::{NumberType, from_raw_bits, to_raw_bits};
use super::types::Type;
use super::{Inclusion, KeyError};
use crate::values::{
    ArrayValue, CoordinateReferenceSystem, DateTimeValue, DateValue, DurationValue,
    LocalDateTimeValue, LocalTimeValue, PointValue, SpaceFillingCurve, TextValue, TimeValue,
    TimeZone, Value, ValueGroup,
};

/// Largest text or array length the 15-bit length headers can carry.
pub const MAX_LENGTH: usize = 0x7FFF;

/// Zone id field value of a zoned date-time using a fixed offset.
const NO_ZONE_ID: i64 = -1;

/// One slot of a key.
#[derive(Debug)]
pub struct KeyState {
    pub(super) ty: Option<Type>,
    pub(super) inclusion: Inclusion,

    pub(super) long0: i64,
    pub(super) long1: i64,
    pub(super) long2: i64,
    pub(super) long3: i64,

    pub(super) bytes: Arc<Vec<u8>>,
    pub(super) bytes_length: usize,
    pub(super) bytes_dereferenced: bool,
    pub(super) is_char: bool,
    pub(super) ignore_length: bool,
    pub(super) is_highest_text: bool,

    pub(super) array_length: usize,
    pub(super) is_highest_array: bool,
    pub(super) long0_array: Vec<i64>,
    pub(super) long1_array: Vec<i64>,
    pub(super) long2_array: Vec<i64>,
    pub(super) long3_array: Vec<i64>,
    pub(super) byte_array_array: Vec<Vec<u8>>,
    pub(super) doubles: Vec<f64>,
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyState {
    /// Create an uninitialized slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ty: None,
            inclusion: Inclusion::Neutral,
            long0: 0,
            long1: 0,
            long2: 0,
            long3: 0,
            bytes: Arc::new(Vec::new()),
            bytes_length: 0,
            bytes_dereferenced: false,
            is_char: false,
            ignore_length: false,
            is_highest_text: false,
            array_length: 0,
            is_highest_array: false,
            long0_array: Vec::new(),
            long1_array: Vec::new(),
            long2_array: Vec::new(),
            long3_array: Vec::new(),
            byte_array_array: Vec::new(),
            doubles: Vec::new(),
        }
    }

    /// The slot's type, or `None` if uninitialized.
    #[must_use]
    pub const fn key_type(&self) -> Option<Type> {
        self.ty
    }

    /// The slot's inclusion.
    #[must_use]
    pub const fn inclusion(&self) -> Inclusion {
        self.inclusion
    }

    /// Reset to the uninitialized state, keeping buffers.
    pub fn clear(&mut self) {
        self.ty = None;
        self.inclusion = Inclusion::Neutral;
        self.long0 = 0;
        self.long1 = 0;
        self.long2 = 0;
        self.long3 = 0;
        self.bytes_length = 0;
        self.is_char = false;
        self.ignore_length = false;
        self.is_highest_text = false;
        self.array_length = 0;
        self.is_highest_array = false;
    }

    fn begin(&mut self, ty: Type, inclusion: Inclusion) {
        self.clear();
        self.ty = Some(ty);
        self.inclusion = inclusion;
    }

    /// Store `value` with the given inclusion.
    pub fn write_value(&mut self, value: &Value, inclusion: Inclusion) -> Result<(), KeyError> {
        match value {
            Value::NoValue => {
                return Err(KeyError::UnsupportedValue(
                    "cannot index the absence of a value".to_string(),
                ));
            }
            Value::Byte(_)
            | Value::Short(_)
            | Value::Int(_)
            | Value::Long(_)
            | Value::Float(_)
            | Value::Double(_) => {
                if let Some((bits, number_type)) = to_raw_bits(value) {
                    self.begin(Type::Number, inclusion);
                    self.write_number(bits, number_type);
                }
            }
            Value::Text(text) => {
                check_length(text.len(), "text")?;
                self.begin(Type::Text, inclusion);
                self.write_text(text.as_bytes(), false);
            }
            Value::Char(c) => {
                let mut buf = [0u8; 4];
                let encoded = c.encode_utf8(&mut buf);
                self.begin(Type::Text, inclusion);
                self.write_text(encoded.as_bytes(), true);
            }
            Value::Boolean(b) => {
                self.begin(Type::Boolean, inclusion);
                self.long0 = i64::from(*b);
            }
            Value::DateTime(v) => {
                self.begin(Type::ZonedDateTime, inclusion);
                (self.long0, self.long1, self.long2, self.long3) = date_time_fields(v);
            }
            Value::LocalDateTime(v) => {
                self.begin(Type::LocalDateTime, inclusion);
                self.long0 = i64::from(v.nano);
                self.long1 = v.epoch_second;
            }
            Value::Date(v) => {
                self.begin(Type::Date, inclusion);
                self.long0 = v.epoch_day;
            }
            Value::Time(v) => {
                self.begin(Type::ZonedTime, inclusion);
                self.long0 = v.nanos_of_day_utc;
                self.long1 = i64::from(v.offset_seconds);
            }
            Value::LocalTime(v) => {
                self.begin(Type::LocalTime, inclusion);
                self.long0 = v.nano_of_day;
            }
            Value::Duration(v) => {
                self.begin(Type::Duration, inclusion);
                (self.long0, self.long1, self.long2, self.long3) = duration_fields(v);
            }
            Value::Point(point) => {
                check_point(point)?;
                self.begin(Type::Geometry, inclusion);
                self.write_crs(point.crs);
                ensure_len(&mut self.doubles, point.coordinates.len());
                self.doubles[..point.coordinates.len()].copy_from_slice(&point.coordinates);
                self.long0 = SpaceFillingCurve::new(point.crs).derived_value_for(&point.coordinates);
            }
            Value::Array(array) => self.write_array(array, inclusion)?,
        }
        Ok(())
    }

    fn write_number(&mut self, bits: i64, number_type: NumberType) {
        self.long0 = bits;
        self.long1 = number_type as i64;
    }

    fn write_crs(&mut self, crs: CoordinateReferenceSystem) {
        self.long1 = i64::from(crs.table_id());
        self.long2 = i64::from(crs.code());
        self.long3 = crs.dimension() as i64;
    }

    /// Store text bytes, reallocating if the buffer was handed out or is too
    /// small.
    pub(super) fn write_text(&mut self, text: &[u8], is_char: bool) {
        self.set_bytes_length(text.len());
        if let Some(buffer) = Arc::get_mut(&mut self.bytes) {
            buffer[..text.len()].copy_from_slice(text);
        }
        self.is_char = is_char;
    }

    /// Make room for `length` text bytes.
    ///
    /// A dereferenced or too small buffer is replaced by a fresh one with 50%
    /// headroom.
    pub(super) fn set_bytes_length(&mut self, length: usize) {
        if self.bytes_dereferenced
            || self.bytes.len() < length
            || Arc::get_mut(&mut self.bytes).is_none()
        {
            self.bytes = Arc::new(vec![0u8; length + length / 2]);
            self.bytes_dereferenced = false;
        }
        self.bytes_length = length;
    }

    fn write_array(&mut self, array: &ArrayValue, inclusion: Inclusion) -> Result<(), KeyError> {
        let length = array.len();
        check_length(length, "array")?;
        let ty = match Type::from_value_group(array.value_group()) {
            Some(ty) => ty,
            None => return Err(KeyError::UnsupportedValue(format!("{array:?}"))),
        };
        self.begin(ty, inclusion);
        self.array_length = length;
        self.ensure_array_capacity(ty, length);
        let written = self.write_array_elements(array);
        if written.is_err() {
            // a half-written array must not be read as a value
            self.clear();
        }
        written
    }

    fn write_array_elements(&mut self, array: &ArrayValue) -> Result<(), KeyError> {
        match array {
            ArrayValue::Byte(_)
            | ArrayValue::Short(_)
            | ArrayValue::Int(_)
            | ArrayValue::Long(_)
            | ArrayValue::Float(_)
            | ArrayValue::Double(_) => self.write_number_array(array),
            ArrayValue::Text(values) => {
                for (i, text) in values.iter().enumerate() {
                    check_length(text.len(), "text array element")?;
                    write_element_bytes(&mut self.byte_array_array[i], text.as_bytes());
                }
            }
            ArrayValue::Char(values) => {
                self.is_char = true;
                for (i, c) in values.iter().enumerate() {
                    let mut buf = [0u8; 4];
                    write_element_bytes(
                        &mut self.byte_array_array[i],
                        c.encode_utf8(&mut buf).as_bytes(),
                    );
                }
            }
            ArrayValue::Boolean(values) => {
                for (slot, b) in self.long0_array.iter_mut().zip(values) {
                    *slot = i64::from(*b);
                }
            }
            ArrayValue::DateTime(values) => {
                for (i, v) in values.iter().enumerate() {
                    (
                        self.long0_array[i],
                        self.long1_array[i],
                        self.long2_array[i],
                        self.long3_array[i],
                    ) = date_time_fields(v);
                }
            }
            ArrayValue::LocalDateTime(values) => {
                for (i, v) in values.iter().enumerate() {
                    self.long0_array[i] = i64::from(v.nano);
                    self.long1_array[i] = v.epoch_second;
                }
            }
            ArrayValue::Date(values) => {
                for (slot, v) in self.long0_array.iter_mut().zip(values) {
                    *slot = v.epoch_day;
                }
            }
            ArrayValue::Time(values) => {
                for (i, v) in values.iter().enumerate() {
                    self.long0_array[i] = v.nanos_of_day_utc;
                    self.long1_array[i] = i64::from(v.offset_seconds);
                }
            }
            ArrayValue::LocalTime(values) => {
                for (slot, v) in self.long0_array.iter_mut().zip(values) {
                    *slot = v.nano_of_day;
                }
            }
            ArrayValue::Duration(values) => {
                for (i, v) in values.iter().enumerate() {
                    (
                        self.long0_array[i],
                        self.long1_array[i],
                        self.long2_array[i],
                        self.long3_array[i],
                    ) = duration_fields(v);
                }
            }
            ArrayValue::Point(points) => self.write_point_array(points)?,
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)] // keep the float bit patterns
    fn write_number_array(&mut self, array: &ArrayValue) {
        let (number_type, bits): (NumberType, Vec<i64>) = match array {
            ArrayValue::Byte(v) => (NumberType::Byte, v.iter().map(|&x| i64::from(x)).collect()),
            ArrayValue::Short(v) => (NumberType::Short, v.iter().map(|&x| i64::from(x)).collect()),
            ArrayValue::Int(v) => (NumberType::Int, v.iter().map(|&x| i64::from(x)).collect()),
            ArrayValue::Long(v) => (NumberType::Long, v.iter().copied().collect()),
            ArrayValue::Float(v) => (
                NumberType::Float,
                v.iter().map(|&x| i64::from(x.to_bits() as i32)).collect(),
            ),
            ArrayValue::Double(v) => (
                NumberType::Double,
                v.iter().map(|&x| x.to_bits() as i64).collect(),
            ),
            _ => return,
        };
        self.long1 = number_type as i64;
        self.long0_array[..bits.len()].copy_from_slice(&bits);
    }

    fn write_point_array(&mut self, points: &[PointValue]) -> Result<(), KeyError> {
        let Some(first) = points.first() else {
            return Ok(());
        };
        let crs = first.crs;
        let dimension = crs.dimension();
        ensure_len(&mut self.doubles, points.len() * dimension);
        let curve = SpaceFillingCurve::new(crs);
        for (i, point) in points.iter().enumerate() {
            check_point(point)?;
            if point.crs != crs {
                return Err(KeyError::UnsupportedValue(
                    "point array mixes coordinate reference systems".to_string(),
                ));
            }
            self.long0_array[i] = curve.derived_value_for(&point.coordinates);
            self.doubles[i * dimension..(i + 1) * dimension].copy_from_slice(&point.coordinates);
        }
        self.write_crs(crs);
        Ok(())
    }

    /// Grow the per-element buffers an array of `ty` needs.
    pub(super) fn ensure_array_capacity(&mut self, ty: Type, length: usize) {
        match ty.element_type() {
            Some(Type::Text) => {
                if self.byte_array_array.len() < length {
                    self.byte_array_array.resize_with(length, Vec::new);
                }
            }
            Some(
                Type::ZonedDateTime | Type::Duration | Type::LocalDateTime | Type::ZonedTime,
            ) => {
                ensure_len(&mut self.long0_array, length);
                ensure_len(&mut self.long1_array, length);
                ensure_len(&mut self.long2_array, length);
                ensure_len(&mut self.long3_array, length);
            }
            Some(Type::Geometry) => {
                ensure_len(&mut self.long0_array, length);
                ensure_len(&mut self.doubles, length * 3);
            }
            Some(_) => ensure_len(&mut self.long0_array, length),
            None => {}
        }
    }

    /// Initialize as a value lower than every value of `group`.
    ///
    /// [`ValueGroup::Unknown`] stands for the lowest type overall.
    pub fn init_as_lowest(&mut self, group: ValueGroup) {
        let ty = Type::from_value_group(group).unwrap_or_else(Type::lowest);
        self.begin(ty, Inclusion::Low);
        match ty {
            Type::Number => {
                if let Some((bits, number_type)) = to_raw_bits(&Value::Double(f64::NEG_INFINITY)) {
                    self.write_number(bits, number_type);
                }
            }
            Type::Text => self.write_text(&[], false),
            Type::Boolean => self.long0 = 0,
            Type::ZonedDateTime | Type::LocalDateTime | Type::Duration => {
                (self.long0, self.long1, self.long2, self.long3) =
                    (i64::MIN, i64::MIN, i64::MIN, i64::MIN);
                if ty == Type::ZonedDateTime {
                    self.long2 = NO_ZONE_ID;
                }
            }
            Type::Date | Type::ZonedTime | Type::LocalTime => {
                self.long0 = i64::MIN;
                self.long1 = i64::MIN;
            }
            Type::Geometry => {
                self.long0 = i64::MIN;
                self.long1 = i64::MIN;
                self.long2 = i64::MIN;
                self.long3 = 0;
            }
            _ => {
                // Empty array of the type
                self.array_length = 0;
                if ty == Type::GeometryArray {
                    self.long1 = i64::MIN;
                    self.long2 = i64::MIN;
                }
            }
        }
    }

    /// Initialize as a value higher than every value of `group`.
    ///
    /// [`ValueGroup::Unknown`] stands for the highest type overall.
    pub fn init_as_highest(&mut self, group: ValueGroup) {
        let ty = Type::from_value_group(group).unwrap_or_else(Type::highest);
        self.begin(ty, Inclusion::High);
        match ty {
            Type::Number => {
                // NaN is the greatest double
                if let Some((bits, number_type)) = to_raw_bits(&Value::Double(f64::NAN)) {
                    self.write_number(bits, number_type);
                }
            }
            Type::Text => {
                self.write_text(&[], false);
                self.is_highest_text = true;
            }
            Type::Boolean => self.long0 = 1,
            Type::ZonedDateTime | Type::LocalDateTime | Type::Duration => {
                (self.long0, self.long1, self.long2, self.long3) =
                    (i64::MAX, i64::MAX, i64::MAX, i64::MAX);
            }
            Type::Date | Type::ZonedTime | Type::LocalTime => {
                self.long0 = i64::MAX;
                self.long1 = i64::MAX;
            }
            Type::Geometry => {
                self.long0 = i64::MAX;
                self.long1 = i64::MAX;
                self.long2 = i64::MAX;
                self.long3 = 0;
            }
            _ => {
                self.array_length = 0;
                self.is_highest_array = true;
                if ty == Type::GeometryArray {
                    self.long1 = i64::MAX;
                    self.long2 = i64::MAX;
                }
            }
        }
    }

    /// Initialize as the low bound of a string prefix search.
    pub fn init_as_prefix_low(&mut self, prefix: &str) {
        self.begin(Type::Text, Inclusion::Low);
        self.write_text(prefix.as_bytes(), false);
    }

    /// Initialize as the high bound of a string prefix search.
    ///
    /// Every text starting with `prefix` compares lower than this bound.
    pub fn init_as_prefix_high(&mut self, prefix: &str) {
        self.begin(Type::Text, Inclusion::High);
        self.write_text(prefix.as_bytes(), false);
        self.ignore_length = true;
    }

    /// Deep copy of `other` into this slot's buffers.
    pub fn copy_from(&mut self, other: &Self) {
        self.copy_meta_from(other);
        match other.ty {
            Some(Type::Text) => {
                let bytes = &other.bytes[..other.bytes_length];
                self.set_bytes_length(bytes.len());
                if let Some(buffer) = Arc::get_mut(&mut self.bytes) {
                    buffer[..bytes.len()].copy_from_slice(bytes);
                }
            }
            Some(Type::Geometry) => {
                let dimension = other.dimension();
                ensure_len(&mut self.doubles, dimension);
                self.doubles[..dimension].copy_from_slice(&other.doubles[..dimension]);
            }
            Some(ty) if ty.is_array() => self.copy_array_from(other, other.array_length),
            _ => {}
        }
    }

    /// Copy type, inclusion, scalar fields and flags, but no payload buffers.
    fn copy_meta_from(&mut self, other: &Self) {
        self.ty = other.ty;
        self.inclusion = other.inclusion;
        self.long0 = other.long0;
        self.long1 = other.long1;
        self.long2 = other.long2;
        self.long3 = other.long3;
        self.is_char = other.is_char;
        self.ignore_length = other.ignore_length;
        self.is_highest_text = other.is_highest_text;
        self.is_highest_array = other.is_highest_array;
        self.array_length = 0;
        self.bytes_length = 0;
    }

    /// Copy the first `length` array elements of `other`.
    pub(super) fn copy_array_from(&mut self, other: &Self, length: usize) {
        let Some(ty) = other.ty else {
            return;
        };
        self.array_length = length;
        self.ensure_array_capacity(ty, length);
        match ty {
            Type::TextArray => {
                for (into, from) in self
                    .byte_array_array
                    .iter_mut()
                    .zip(&other.byte_array_array)
                    .take(length)
                {
                    write_element_bytes(into, from);
                }
            }
            Type::GeometryArray => {
                let dimension = other.dimension();
                self.long0_array[..length].copy_from_slice(&other.long0_array[..length]);
                ensure_len(&mut self.doubles, length * dimension);
                self.doubles[..length * dimension]
                    .copy_from_slice(&other.doubles[..length * dimension]);
            }
            Type::ZonedDateTimeArray
            | Type::DurationArray
            | Type::LocalDateTimeArray
            | Type::ZonedTimeArray => {
                self.long0_array[..length].copy_from_slice(&other.long0_array[..length]);
                self.long1_array[..length].copy_from_slice(&other.long1_array[..length]);
                self.long2_array[..length].copy_from_slice(&other.long2_array[..length]);
                self.long3_array[..length].copy_from_slice(&other.long3_array[..length]);
            }
            _ => self.long0_array[..length].copy_from_slice(&other.long0_array[..length]),
        }
    }

    /// Compute the shortest slot `into` such that `left < into <= right`.
    ///
    /// Text keeps the shortest prefix of `right` that still differs from
    /// `left`; arrays keep the elements of `right` up to one past the last
    /// element equal to `left`; every other type copies `right`.
    pub fn minimal_splitter(left: &Self, right: &Self, into: &mut Self) {
        match right.ty {
            Some(Type::Text) if !right.is_highest_text => {
                let length = if left.ty == Some(Type::Text) && !left.is_highest_text {
                    minimal_length_to_differ(
                        &left.bytes[..left.bytes_length],
                        &right.bytes[..right.bytes_length],
                    )
                } else {
                    0
                };
                into.begin(Type::Text, right.inclusion);
                into.write_text(&right.bytes[..length], right.is_char);
                into.ignore_length = right.ignore_length;
            }
            Some(ty) if ty.is_array() && !right.is_highest_array => {
                let mut last_equal_index: isize = -1;
                if left.ty == right.ty && !left.is_highest_array {
                    for index in 0..left.array_length.min(right.array_length) {
                        if left.compare_element(index, right, index).is_ne() {
                            break;
                        }
                        last_equal_index += 1;
                    }
                }
                let target = usize::try_from(last_equal_index + 2).unwrap_or(0);
                into.copy_meta_from(right);
                into.copy_array_from(right, right.array_length.min(target));
            }
            _ => into.copy_from(right),
        }
    }

    pub(super) fn dimension(&self) -> usize {
        usize::try_from(self.long3).unwrap_or(0)
    }

    pub(super) fn crs(&self) -> Result<CoordinateReferenceSystem, KeyError> {
        let table = u8::try_from(self.long1).ok();
        let code = u32::try_from(self.long2).ok();
        table
            .zip(code)
            .and_then(|(table, code)| CoordinateReferenceSystem::from_table_and_code(table, code))
            .ok_or_else(|| {
                KeyError::Corruption(format!(
                    "unknown coordinate reference system {}:{}",
                    self.long1, self.long2
                ))
            })
    }

    /// Decode the slot back into a value.
    ///
    /// Text is returned without copying; the slot then allocates a new buffer
    /// on its next text write.
    pub fn as_value(&mut self) -> Result<Value, KeyError> {
        let Some(ty) = self.ty else {
            return Ok(Value::NoValue);
        };
        Ok(match ty {
            Type::Number => from_raw_bits(self.long0, NumberType::from_field(self.long1)),
            Type::Text => {
                if self.is_char {
                    Value::Char(decode_char(&self.bytes[..self.bytes_length])?)
                } else {
                    self.bytes_dereferenced = true;
                    Value::Text(TextValue::from_shared(
                        Arc::clone(&self.bytes),
                        self.bytes_length,
                    ))
                }
            }
            Type::Boolean => Value::Boolean(self.long0 != 0),
            Type::ZonedDateTime => {
                Value::DateTime(date_time_value(self.long0, self.long1, self.long2, self.long3))
            }
            Type::LocalDateTime => Value::LocalDateTime(LocalDateTimeValue::new(
                self.long1,
                to_i32(self.long0),
            )),
            Type::Date => Value::Date(DateValue::new(self.long0)),
            Type::ZonedTime => Value::Time(TimeValue::new(self.long0, to_i32(self.long1))),
            Type::LocalTime => Value::LocalTime(LocalTimeValue::new(self.long0)),
            Type::Duration => Value::Duration(DurationValue::from_average_seconds(
                self.long0,
                to_i32(self.long1),
                self.long2,
                self.long3,
            )),
            Type::Geometry => {
                let crs = self.crs()?;
                Value::Point(PointValue::new(crs, self.doubles[..crs.dimension()].to_vec()))
            }
            _ => Value::Array(self.array_as_value(ty)?),
        })
    }

    fn array_as_value(&self, ty: Type) -> Result<ArrayValue, KeyError> {
        let n = self.array_length;
        Ok(match ty {
            Type::NumberArray => number_array_value(
                &self.long0_array[..n],
                NumberType::from_field(self.long1),
            ),
            Type::TextArray => {
                let elements = &self.byte_array_array[..n];
                if self.is_char {
                    ArrayValue::Char(
                        elements
                            .iter()
                            .map(|bytes| decode_char(bytes))
                            .collect::<Result<_, _>>()?,
                    )
                } else {
                    // Copies: array elements are never shared with callers
                    ArrayValue::Text(
                        elements
                            .iter()
                            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                            .collect(),
                    )
                }
            }
            Type::BooleanArray => {
                ArrayValue::Boolean(self.long0_array[..n].iter().map(|&b| b != 0).collect())
            }
            Type::ZonedDateTimeArray => ArrayValue::DateTime(
                (0..n)
                    .map(|i| {
                        date_time_value(
                            self.long0_array[i],
                            self.long1_array[i],
                            self.long2_array[i],
                            self.long3_array[i],
                        )
                    })
                    .collect(),
            ),
            Type::LocalDateTimeArray => ArrayValue::LocalDateTime(
                (0..n)
                    .map(|i| {
                        LocalDateTimeValue::new(self.long1_array[i], to_i32(self.long0_array[i]))
                    })
                    .collect(),
            ),
            Type::DateArray => {
                ArrayValue::Date(self.long0_array[..n].iter().map(|&d| DateValue::new(d)).collect())
            }
            Type::ZonedTimeArray => ArrayValue::Time(
                (0..n)
                    .map(|i| TimeValue::new(self.long0_array[i], to_i32(self.long1_array[i])))
                    .collect(),
            ),
            Type::LocalTimeArray => ArrayValue::LocalTime(
                self.long0_array[..n]
                    .iter()
                    .map(|&t| LocalTimeValue::new(t))
                    .collect(),
            ),
            Type::DurationArray => ArrayValue::Duration(
                (0..n)
                    .map(|i| {
                        DurationValue::from_average_seconds(
                            self.long0_array[i],
                            to_i32(self.long1_array[i]),
                            self.long2_array[i],
                            self.long3_array[i],
                        )
                    })
                    .collect(),
            ),
            Type::GeometryArray => {
                if n == 0 {
                    ArrayValue::Point(Vec::new())
                } else {
                    let crs = self.crs()?;
                    let dimension = crs.dimension();
                    ArrayValue::Point(
                        self.doubles[..n * dimension]
                            .chunks(dimension)
                            .map(|coordinates| PointValue::new(crs, coordinates.to_vec()))
                            .collect(),
                    )
                }
            }
            _ => return Err(KeyError::Corruption(format!("{ty:?} is not an array type"))),
        })
    }
}

/// Grow `buffer` to at least `length` elements.
pub(super) fn ensure_len<T: Default + Copy>(buffer: &mut Vec<T>, length: usize) {
    if buffer.len() < length {
        buffer.resize(length, T::default());
    }
}

/// Overwrite a text-array element in place.
pub(super) fn write_element_bytes(into: &mut Vec<u8>, bytes: &[u8]) {
    into.clear();
    into.extend_from_slice(bytes);
}

fn check_length(length: usize, what: &str) -> Result<(), KeyError> {
    if length > MAX_LENGTH {
        return Err(KeyError::UnsupportedValue(format!(
            "{what} of length {length} exceeds {MAX_LENGTH}"
        )));
    }
    Ok(())
}

fn check_point(point: &PointValue) -> Result<(), KeyError> {
    if point.is_valid() {
        Ok(())
    } else {
        Err(KeyError::UnsupportedValue(format!(
            "point with {} coordinates in {:?}",
            point.coordinates.len(),
            point.crs
        )))
    }
}

#[allow(clippy::cast_lossless)] // From is not const
const fn date_time_fields(value: &DateTimeValue) -> (i64, i64, i64, i64) {
    let (zone_id, offset) = match value.zone {
        TimeZone::Offset(seconds) => (NO_ZONE_ID, seconds as i64),
        TimeZone::Region(id) => (id as i64, 0),
    };
    (value.epoch_second_utc, value.nano as i64, zone_id, offset)
}

fn date_time_value(epoch_second: i64, nano: i64, zone_id: i64, offset: i64) -> DateTimeValue {
    let zone = u16::try_from(zone_id).map_or_else(
        |_| TimeZone::Offset(to_i32(offset)),
        TimeZone::Region,
    );
    DateTimeValue::new(epoch_second, to_i32(nano), zone)
}

#[allow(clippy::cast_lossless)] // From is not const
const fn duration_fields(value: &DurationValue) -> (i64, i64, i64, i64) {
    (
        value.average_seconds(),
        value.nanos as i64,
        value.months,
        value.days,
    )
}

#[allow(clippy::cast_possible_truncation)] // fields were written from i32
const fn to_i32(field: i64) -> i32 {
    field as i32
}

fn decode_char(bytes: &[u8]) -> Result<char, KeyError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| KeyError::Corruption("invalid char encoding".to_string()))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // raw bits were produced from this width
fn number_array_value(bits: &[i64], number_type: NumberType) -> ArrayValue {
    match number_type {
        NumberType::Byte => ArrayValue::Byte(bits.iter().map(|&b| b as i8).collect()),
        NumberType::Short => ArrayValue::Short(bits.iter().map(|&b| b as i16).collect()),
        NumberType::Int => ArrayValue::Int(bits.iter().map(|&b| b as i32).collect()),
        NumberType::Long => ArrayValue::Long(bits.to_vec()),
        NumberType::Float => {
            ArrayValue::Float(bits.iter().map(|&b| f32::from_bits(b as u32)).collect())
        }
        NumberType::Double => {
            ArrayValue::Double(bits.iter().map(|&b| f64::from_bits(b as u64)).collect())
        }
    }
}

/// Length of the shortest prefix of `right` that differs from `left`.
pub(super) fn minimal_length_to_differ(left: &[u8], right: &[u8]) -> usize {
    let equal = left
        .iter()
        .zip(right)
        .take_while(|(l, r)| l == r)
        .count();
    right.len().min(equal + 1)
}
