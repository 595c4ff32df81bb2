//! Raw-bits representation of numbers.
//!
//! A number is stored as a 64-bit pattern plus a [`NumberType`] tag.
//! Integral types keep their sign-extended value; floats keep their IEEE bit
//! pattern (`f32` bits sign-extended from 32 bits).
//!
//! Two integrals compare exactly as `i64`. Any comparison involving a float
//! widens both sides to `f64`, which loses precision for integrals beyond
//! 2^53. Doubles order like Java's `Double.compare`: `-0.0 < 0.0` and NaN
//! above every other value.

use std::cmp::Ordering;

use crate::values::Value;

/// Width and kind of a stored number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum NumberType {
    Byte = 0,
    Short = 1,
    Int = 2,
    Long = 3,
    Float = 4,
    Double = 5,
}

impl TryFrom<u8> for NumberType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Byte),
            1 => Ok(Self::Short),
            2 => Ok(Self::Int),
            3 => Ok(Self::Long),
            4 => Ok(Self::Float),
            5 => Ok(Self::Double),
            _ => Err(value),
        }
    }
}

impl NumberType {
    /// Bytes used by the raw value on disk.
    #[must_use]
    pub const fn raw_size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
        }
    }

    /// Whether the type holds an integral value.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    /// Decode the tag stored in a key's `i64` field.
    pub(super) fn from_field(field: i64) -> Self {
        u8::try_from(field)
            .ok()
            .and_then(|tag| Self::try_from(tag).ok())
            .unwrap_or(Self::Double)
    }
}

/// Raw bits and type of a scalar number value, or `None` if not a number.
#[must_use]
pub fn to_raw_bits(value: &Value) -> Option<(i64, NumberType)> {
    match *value {
        Value::Byte(v) => Some((i64::from(v), NumberType::Byte)),
        Value::Short(v) => Some((i64::from(v), NumberType::Short)),
        Value::Int(v) => Some((i64::from(v), NumberType::Int)),
        Value::Long(v) => Some((v, NumberType::Long)),
        #[allow(clippy::cast_possible_wrap)] // keep the bit pattern
        Value::Float(v) => Some((i64::from(v.to_bits() as i32), NumberType::Float)),
        #[allow(clippy::cast_possible_wrap)] // keep the bit pattern
        Value::Double(v) => Some((v.to_bits() as i64, NumberType::Double)),
        _ => None,
    }
}

/// Rebuild the value from raw bits.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // raw bits were produced from this width
pub fn from_raw_bits(bits: i64, number_type: NumberType) -> Value {
    match number_type {
        NumberType::Byte => Value::Byte(bits as i8),
        NumberType::Short => Value::Short(bits as i16),
        NumberType::Int => Value::Int(bits as i32),
        NumberType::Long => Value::Long(bits),
        NumberType::Float => Value::Float(f32::from_bits(bits as u32)),
        NumberType::Double => Value::Double(f64::from_bits(bits as u64)),
    }
}

/// Write the raw value using the width of its type.
#[allow(clippy::cast_possible_truncation)] // raw bits were produced from this width
pub(super) fn put_raw_bits(
    cursor: &mut dyn crate::storage::cursor::WriteCursor,
    bits: i64,
    number_type: NumberType,
) {
    match number_type.raw_size() {
        1 => cursor.put_i8(bits as i8),
        2 => cursor.put_i16(bits as i16),
        4 => cursor.put_i32(bits as i32),
        _ => cursor.put_i64(bits),
    }
}

/// Read a raw value of the given type's width.
pub(super) fn read_raw_bits(
    cursor: &mut dyn crate::storage::cursor::ReadCursor,
    number_type: NumberType,
) -> Result<i64, crate::storage::cursor::CursorError> {
    Ok(match number_type.raw_size() {
        1 => i64::from(cursor.get_i8()?),
        2 => i64::from(cursor.get_i16()?),
        4 => i64::from(cursor.get_i32()?),
        _ => cursor.get_i64()?,
    })
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)] // widening to f64 is the documented comparison semantics
fn as_double(bits: i64, number_type: NumberType) -> f64 {
    match number_type {
        NumberType::Float => f64::from(f32::from_bits(bits as u32)),
        NumberType::Double => f64::from_bits(bits as u64),
        _ => bits as f64,
    }
}

/// Compare two numbers given as raw bits.
#[must_use]
pub fn compare_raw_bits(
    lhs: i64,
    lhs_type: NumberType,
    rhs: i64,
    rhs_type: NumberType,
) -> Ordering {
    if lhs_type.is_integral() && rhs_type.is_integral() {
        return lhs.cmp(&rhs);
    }
    compare_doubles(as_double(lhs, lhs_type), as_double(rhs, rhs_type))
}

/// Total order on doubles: numeric order, `-0.0 < 0.0`, NaN greatest.
#[must_use]
pub fn compare_doubles(lhs: f64, rhs: f64) -> Ordering {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Less) => Ordering::Less,
        Some(Ordering::Greater) => Ordering::Greater,
        _ => canonical_bits(lhs).cmp(&canonical_bits(rhs)),
    }
}

#[allow(clippy::cast_possible_wrap)] // ordering on the signed bit pattern is intended
const fn canonical_bits(value: f64) -> i64 {
    if value.is_nan() {
        0x7ff8_0000_0000_0000
    } else {
        value.to_bits() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: &Value) -> (i64, NumberType) {
        to_raw_bits(value).expect("number value")
    }

    fn compare(lhs: &Value, rhs: &Value) -> Ordering {
        let (l, lt) = raw(lhs);
        let (r, rt) = raw(rhs);
        compare_raw_bits(l, lt, r, rt)
    }

    #[test]
    fn test_number_type_conversion() {
        assert_eq!(NumberType::try_from(0), Ok(NumberType::Byte));
        assert_eq!(NumberType::try_from(5), Ok(NumberType::Double));
        assert_eq!(NumberType::try_from(6), Err(6));
    }

    #[test]
    fn test_raw_bits_roundtrip_keeps_width() {
        for value in [
            Value::Byte(-3),
            Value::Short(i16::MIN),
            Value::Int(42),
            Value::Long(i64::MAX),
            Value::Float(-1.5),
            Value::Double(f64::INFINITY),
        ] {
            let (bits, number_type) = raw(&value);
            assert_eq!(from_raw_bits(bits, number_type), value);
        }
    }

    #[test]
    fn test_compare_across_widths() {
        assert_eq!(compare(&Value::Byte(1), &Value::Long(1)), Ordering::Equal);
        assert_eq!(compare(&Value::Int(2), &Value::Double(1.5)), Ordering::Greater);
        assert_eq!(compare(&Value::Float(0.5), &Value::Short(1)), Ordering::Less);
        assert_eq!(compare(&Value::Float(0.5), &Value::Double(0.5)), Ordering::Equal);
    }

    #[test]
    fn test_compare_extreme_integrals_lose_precision_against_floats() {
        // 2^53 + 1 is not representable as f64 and widens to 2^53
        let big = (1i64 << 53) + 1;
        #[allow(clippy::cast_precision_loss)]
        let widened = (1i64 << 53) as f64;
        assert_eq!(
            compare(&Value::Long(big), &Value::Double(widened)),
            Ordering::Equal
        );
        assert_eq!(
            compare(&Value::Long(big), &Value::Long(1 << 53)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_double_order_special_values() {
        assert_eq!(compare_doubles(-0.0, 0.0), Ordering::Less);
        assert_eq!(compare_doubles(f64::NAN, f64::INFINITY), Ordering::Greater);
        assert_eq!(compare_doubles(f64::NAN, f64::NAN), Ordering::Equal);
        assert_eq!(compare_doubles(f64::NEG_INFINITY, f64::MIN), Ordering::Less);
    }
}
