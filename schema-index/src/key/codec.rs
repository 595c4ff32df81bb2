//! On-disk encoding of key slots.
//!
//! Payload layouts are documented on [`Type`]. Reads validate lengths against
//! the bytes the caller says belong to the slot, so corrupt data surfaces as
//! [`KeyError::Corruption`] instead of oversized allocations.

use super::number::{NumberType, put_raw_bits, read_raw_bits};
use super::state::{KeyState, ensure_len};
use super::types::Type;
use super::{KeyError, TYPE_ID_SIZE};
use crate::storage::cursor::{ReadCursor, WriteCursor};
use crate::values::{CoordinateReferenceSystem, TimeZone};

/// Size of a text or array length header.
const SIZE_LENGTH_HEADER: usize = 2;

/// Length header bit marking char values.
const CHAR_FLAG: u16 = 0x8000;

/// Length header bits holding the length.
const LENGTH_MASK: u16 = 0x7FFF;

const SIZE_NUMBER_TYPE: usize = 1;
const SIZE_BOOLEAN: usize = 1;
const SIZE_ZONED_DATE_TIME: usize = 8 + 4 + 4;
const SIZE_LOCAL_DATE_TIME: usize = 8 + 4;
const SIZE_DATE: usize = 8;
const SIZE_ZONED_TIME: usize = 8 + 4;
const SIZE_LOCAL_TIME: usize = 8;
const SIZE_DURATION: usize = 8 + 4 + 8 + 8;
const SIZE_CRS_HEADER: usize = 4;
const SIZE_CURVE_VALUE: usize = 8;
const SIZE_COORDINATE: usize = 8;

const CRS_TABLE_SHIFT: u32 = 29;
const CRS_DIMENSION_SHIFT: u32 = 22;
const CRS_DIMENSION_MASK: u32 = 0x7F;
const CRS_CODE_MASK: u32 = 0x003F_FFFF;

/// Largest fixed-size scalar payload plus its type id.
pub const BIGGEST_STATIC_SIZE: usize =
    TYPE_ID_SIZE + SIZE_CRS_HEADER + SIZE_CURVE_VALUE + 3 * SIZE_COORDINATE;

impl KeyState {
    /// Encoded size of the slot including its type id.
    ///
    /// Uninitialized slots encode to nothing.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ty.map_or(0, |ty| TYPE_ID_SIZE + self.value_size(ty))
    }

    fn value_size(&self, ty: Type) -> usize {
        let n = self.array_length;
        match ty {
            Type::Number => SIZE_NUMBER_TYPE + NumberType::from_field(self.long1).raw_size(),
            Type::Text => SIZE_LENGTH_HEADER + self.bytes_length,
            Type::Boolean => SIZE_BOOLEAN,
            Type::ZonedDateTime => SIZE_ZONED_DATE_TIME,
            Type::LocalDateTime => SIZE_LOCAL_DATE_TIME,
            Type::Date => SIZE_DATE,
            Type::ZonedTime => SIZE_ZONED_TIME,
            Type::LocalTime => SIZE_LOCAL_TIME,
            Type::Duration => SIZE_DURATION,
            Type::Geometry => geometry_size(self.dimension()),
            Type::NumberArray => {
                SIZE_NUMBER_TYPE
                    + SIZE_LENGTH_HEADER
                    + n * NumberType::from_field(self.long1).raw_size()
            }
            Type::TextArray => {
                SIZE_LENGTH_HEADER
                    + self.byte_array_array[..n]
                        .iter()
                        .map(|bytes| SIZE_LENGTH_HEADER + bytes.len())
                        .sum::<usize>()
            }
            Type::BooleanArray => SIZE_LENGTH_HEADER + n * SIZE_BOOLEAN,
            Type::ZonedDateTimeArray => SIZE_LENGTH_HEADER + n * SIZE_ZONED_DATE_TIME,
            Type::LocalDateTimeArray => SIZE_LENGTH_HEADER + n * SIZE_LOCAL_DATE_TIME,
            Type::DateArray => SIZE_LENGTH_HEADER + n * SIZE_DATE,
            Type::ZonedTimeArray => SIZE_LENGTH_HEADER + n * SIZE_ZONED_TIME,
            Type::LocalTimeArray => SIZE_LENGTH_HEADER + n * SIZE_LOCAL_TIME,
            Type::DurationArray => SIZE_LENGTH_HEADER + n * SIZE_DURATION,
            Type::GeometryArray => {
                SIZE_CRS_HEADER
                    + SIZE_LENGTH_HEADER
                    + n * (SIZE_CURVE_VALUE + self.dimension() * SIZE_COORDINATE)
            }
        }
    }

    /// Write the type id and payload.
    #[allow(clippy::cast_possible_truncation)] // lengths are capped at 0x7FFF on write
    pub fn put(&self, cursor: &mut dyn WriteCursor) {
        let Some(ty) = self.ty else {
            return;
        };
        cursor.put_u8(ty.type_id());
        let n = self.array_length;
        match ty {
            Type::Number => {
                let number_type = NumberType::from_field(self.long1);
                cursor.put_u8(number_type as u8);
                put_raw_bits(cursor, self.long0, number_type);
            }
            Type::Text => {
                cursor.put_u16(length_header(self.bytes_length, self.is_char));
                cursor.put_bytes(&self.bytes[..self.bytes_length]);
            }
            Type::Boolean => cursor.put_u8(u8::from(self.long0 != 0)),
            Type::ZonedDateTime => {
                put_date_time(cursor, self.long0, self.long1, self.long2, self.long3);
            }
            Type::LocalDateTime => {
                cursor.put_i64(self.long1);
                cursor.put_i32(self.long0 as i32);
            }
            Type::Date | Type::LocalTime => cursor.put_i64(self.long0),
            Type::ZonedTime => {
                cursor.put_i64(self.long0);
                cursor.put_i32(self.long1 as i32);
            }
            Type::Duration => {
                put_duration(cursor, self.long0, self.long1, self.long2, self.long3);
            }
            Type::Geometry => {
                cursor.put_u32(self.crs_header());
                cursor.put_i64(self.long0);
                for &coordinate in &self.doubles[..self.dimension()] {
                    cursor.put_u64(coordinate.to_bits());
                }
            }
            Type::NumberArray => {
                let number_type = NumberType::from_field(self.long1);
                cursor.put_u8(number_type as u8);
                cursor.put_u16(length_header(n, false));
                for &bits in &self.long0_array[..n] {
                    put_raw_bits(cursor, bits, number_type);
                }
            }
            Type::TextArray => {
                cursor.put_u16(length_header(n, self.is_char));
                for bytes in &self.byte_array_array[..n] {
                    cursor.put_u16(length_header(bytes.len(), false));
                    cursor.put_bytes(bytes);
                }
            }
            Type::BooleanArray => {
                cursor.put_u16(length_header(n, false));
                for &b in &self.long0_array[..n] {
                    cursor.put_u8(u8::from(b != 0));
                }
            }
            Type::ZonedDateTimeArray => {
                cursor.put_u16(length_header(n, false));
                for i in 0..n {
                    put_date_time(
                        cursor,
                        self.long0_array[i],
                        self.long1_array[i],
                        self.long2_array[i],
                        self.long3_array[i],
                    );
                }
            }
            Type::LocalDateTimeArray => {
                cursor.put_u16(length_header(n, false));
                for i in 0..n {
                    cursor.put_i64(self.long1_array[i]);
                    cursor.put_i32(self.long0_array[i] as i32);
                }
            }
            Type::DateArray | Type::LocalTimeArray => {
                cursor.put_u16(length_header(n, false));
                for &value in &self.long0_array[..n] {
                    cursor.put_i64(value);
                }
            }
            Type::ZonedTimeArray => {
                cursor.put_u16(length_header(n, false));
                for i in 0..n {
                    cursor.put_i64(self.long0_array[i]);
                    cursor.put_i32(self.long1_array[i] as i32);
                }
            }
            Type::DurationArray => {
                cursor.put_u16(length_header(n, false));
                for i in 0..n {
                    put_duration(
                        cursor,
                        self.long0_array[i],
                        self.long1_array[i],
                        self.long2_array[i],
                        self.long3_array[i],
                    );
                }
            }
            Type::GeometryArray => {
                let dimension = self.dimension();
                cursor.put_u32(self.crs_header());
                cursor.put_u16(length_header(n, false));
                for i in 0..n {
                    cursor.put_i64(self.long0_array[i]);
                    for &coordinate in &self.doubles[i * dimension..(i + 1) * dimension] {
                        cursor.put_u64(coordinate.to_bits());
                    }
                }
            }
        }
    }

    /// Read a slot of at most `size` bytes, including the type id.
    ///
    /// Returns the number of bytes consumed.
    pub fn read(&mut self, cursor: &mut dyn ReadCursor, size: usize) -> Result<usize, KeyError> {
        if size < TYPE_ID_SIZE {
            return Err(KeyError::Corruption(format!("slot size {size} too small")));
        }
        let type_id = cursor.get_u8()?;
        let ty = Type::from_type_id(type_id)
            .ok_or_else(|| KeyError::Corruption(format!("unknown type id {type_id}")))?;
        self.clear();
        self.ty = Some(ty);
        self.read_value(ty, cursor, size - TYPE_ID_SIZE)?;
        let consumed = self.size();
        if consumed > size {
            return Err(KeyError::Corruption(format!(
                "slot of {consumed} bytes exceeds available {size}"
            )));
        }
        Ok(consumed)
    }

    fn read_value(
        &mut self,
        ty: Type,
        cursor: &mut dyn ReadCursor,
        max: usize,
    ) -> Result<(), KeyError> {
        match ty {
            Type::Number => {
                let number_type = read_number_type(cursor)?;
                self.long1 = number_type as i64;
                self.long0 = read_raw_bits(cursor, number_type)?;
            }
            Type::Text => {
                let (length, is_char) = read_length_header(cursor)?;
                check_fits(length, 1, max.saturating_sub(SIZE_LENGTH_HEADER), "text")?;
                self.set_bytes_length(length);
                if let Some(buffer) = std::sync::Arc::get_mut(&mut self.bytes) {
                    cursor.get_bytes(&mut buffer[..length])?;
                }
                self.is_char = is_char;
            }
            Type::Boolean => self.long0 = i64::from(cursor.get_u8()? != 0),
            Type::ZonedDateTime => {
                (self.long0, self.long1, self.long2, self.long3) = read_date_time(cursor)?;
            }
            Type::LocalDateTime => {
                self.long1 = cursor.get_i64()?;
                self.long0 = i64::from(cursor.get_i32()?);
            }
            Type::Date | Type::LocalTime => self.long0 = cursor.get_i64()?,
            Type::ZonedTime => {
                self.long0 = cursor.get_i64()?;
                self.long1 = i64::from(cursor.get_i32()?);
            }
            Type::Duration => {
                (self.long0, self.long1, self.long2, self.long3) = read_duration(cursor)?;
            }
            Type::Geometry => {
                let crs = self.read_crs_header(cursor)?;
                self.long0 = cursor.get_i64()?;
                let dimension = crs.dimension();
                ensure_len(&mut self.doubles, dimension);
                for coordinate in &mut self.doubles[..dimension] {
                    *coordinate = f64::from_bits(cursor.get_u64()?);
                }
            }
            _ => self.read_array(ty, cursor, max)?,
        }
        Ok(())
    }

    fn read_array(
        &mut self,
        ty: Type,
        cursor: &mut dyn ReadCursor,
        max: usize,
    ) -> Result<(), KeyError> {
        let mut crs = None;
        let mut number_type = NumberType::Long;
        match ty {
            Type::NumberArray => number_type = read_number_type(cursor)?,
            Type::GeometryArray => crs = Some(self.read_crs_header(cursor)?),
            _ => {}
        }
        let (n, is_char) = read_length_header(cursor)?;
        check_fits(n, 1, max, "array")?;
        self.array_length = n;
        self.is_char = is_char;
        self.ensure_array_capacity(ty, n);

        match ty {
            Type::NumberArray => {
                self.long1 = number_type as i64;
                for bits in &mut self.long0_array[..n] {
                    *bits = read_raw_bits(cursor, number_type)?;
                }
            }
            Type::TextArray => {
                for element in &mut self.byte_array_array[..n] {
                    let (length, _) = read_length_header(cursor)?;
                    check_fits(length, 1, max, "text array element")?;
                    element.clear();
                    element.resize(length, 0);
                    cursor.get_bytes(element)?;
                }
            }
            Type::BooleanArray => {
                for b in &mut self.long0_array[..n] {
                    *b = i64::from(cursor.get_u8()? != 0);
                }
            }
            Type::ZonedDateTimeArray => {
                for i in 0..n {
                    (
                        self.long0_array[i],
                        self.long1_array[i],
                        self.long2_array[i],
                        self.long3_array[i],
                    ) = read_date_time(cursor)?;
                }
            }
            Type::LocalDateTimeArray => {
                for i in 0..n {
                    self.long1_array[i] = cursor.get_i64()?;
                    self.long0_array[i] = i64::from(cursor.get_i32()?);
                }
            }
            Type::DateArray | Type::LocalTimeArray => {
                for value in &mut self.long0_array[..n] {
                    *value = cursor.get_i64()?;
                }
            }
            Type::ZonedTimeArray => {
                for i in 0..n {
                    self.long0_array[i] = cursor.get_i64()?;
                    self.long1_array[i] = i64::from(cursor.get_i32()?);
                }
            }
            Type::DurationArray => {
                for i in 0..n {
                    (
                        self.long0_array[i],
                        self.long1_array[i],
                        self.long2_array[i],
                        self.long3_array[i],
                    ) = read_duration(cursor)?;
                }
            }
            Type::GeometryArray => {
                let dimension = crs.map_or(0, CoordinateReferenceSystem::dimension);
                ensure_len(&mut self.doubles, n * dimension);
                for i in 0..n {
                    self.long0_array[i] = cursor.get_i64()?;
                    for coordinate in &mut self.doubles[i * dimension..(i + 1) * dimension] {
                        *coordinate = f64::from_bits(cursor.get_u64()?);
                    }
                }
            }
            _ => return Err(KeyError::Corruption(format!("{ty:?} is not an array type"))),
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // CRS fields fit their bit widths
    fn crs_header(&self) -> u32 {
        ((self.long1 as u32) << CRS_TABLE_SHIFT)
            | ((self.long3 as u32 & CRS_DIMENSION_MASK) << CRS_DIMENSION_SHIFT)
            | (self.long2 as u32 & CRS_CODE_MASK)
    }

    fn read_crs_header(
        &mut self,
        cursor: &mut dyn ReadCursor,
    ) -> Result<CoordinateReferenceSystem, KeyError> {
        let header = cursor.get_u32()?;
        let table = header >> CRS_TABLE_SHIFT;
        let dimension = (header >> CRS_DIMENSION_SHIFT) & CRS_DIMENSION_MASK;
        let code = header & CRS_CODE_MASK;
        self.long1 = i64::from(table);
        self.long2 = i64::from(code);
        self.long3 = i64::from(dimension);
        let crs = self.crs()?;
        if crs.dimension() != self.dimension() {
            return Err(KeyError::Corruption(format!(
                "{crs:?} stored with {dimension} dimensions"
            )));
        }
        Ok(crs)
    }
}

const fn geometry_size(dimension: usize) -> usize {
    SIZE_CRS_HEADER + SIZE_CURVE_VALUE + dimension * SIZE_COORDINATE
}

#[allow(clippy::cast_possible_truncation)] // lengths are capped at 0x7FFF on write
const fn length_header(length: usize, is_char: bool) -> u16 {
    let header = length as u16 & LENGTH_MASK;
    if is_char { header | CHAR_FLAG } else { header }
}

fn read_length_header(cursor: &mut dyn ReadCursor) -> Result<(usize, bool), KeyError> {
    let header = cursor.get_u16()?;
    Ok((usize::from(header & LENGTH_MASK), header & CHAR_FLAG != 0))
}

fn read_number_type(cursor: &mut dyn ReadCursor) -> Result<NumberType, KeyError> {
    let tag = cursor.get_u8()?;
    NumberType::try_from(tag).map_err(|tag| KeyError::Corruption(format!("unknown number type {tag}")))
}

/// Reject lengths that cannot fit in the remaining slot bytes.
fn check_fits(count: usize, min_element_size: usize, max: usize, what: &str) -> Result<(), KeyError> {
    if count * min_element_size > max {
        return Err(KeyError::Corruption(format!(
            "{what} length {count} exceeds available {max} bytes"
        )));
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // fields were written from i32
fn put_date_time(cursor: &mut dyn WriteCursor, epoch: i64, nano: i64, zone_id: i64, offset: i64) {
    cursor.put_i64(epoch);
    cursor.put_i32(nano as i32);
    let zone = u16::try_from(zone_id).map_or(TimeZone::Offset(offset as i32), TimeZone::Region);
    cursor.put_i32(zone.encode());
}

fn read_date_time(cursor: &mut dyn ReadCursor) -> Result<(i64, i64, i64, i64), KeyError> {
    let epoch = cursor.get_i64()?;
    let nano = i64::from(cursor.get_i32()?);
    Ok(match TimeZone::decode(cursor.get_i32()?) {
        TimeZone::Offset(seconds) => (epoch, nano, -1, i64::from(seconds)),
        TimeZone::Region(id) => (epoch, nano, i64::from(id), 0),
    })
}

#[allow(clippy::cast_possible_truncation)] // nanos were written from i32
fn put_duration(cursor: &mut dyn WriteCursor, seconds: i64, nanos: i64, months: i64, days: i64) {
    cursor.put_i64(seconds);
    cursor.put_i32(nanos as i32);
    cursor.put_i64(months);
    cursor.put_i64(days);
}

fn read_duration(cursor: &mut dyn ReadCursor) -> Result<(i64, i64, i64, i64), KeyError> {
    let seconds = cursor.get_i64()?;
    let nanos = i64::from(cursor.get_i32()?);
    let months = cursor.get_i64()?;
    let days = cursor.get_i64()?;
    Ok((seconds, nanos, months, days))
}
