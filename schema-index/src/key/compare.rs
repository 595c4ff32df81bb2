//! Ordering of key slots.
//!
//! Slots compare by type rank first, then by their type's value order, and
//! finally by [`Inclusion`](super::Inclusion). An uninitialized slot sorts
//! before everything.

use std::cmp::Ordering;

use super::number::{NumberType, compare_doubles, compare_raw_bits};
use super::state::KeyState;
use super::types::Type;

impl KeyState {
    /// Compare the values of two slots, ignoring entity ids.
    #[must_use]
    pub fn compare_value_to(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = match (self.ty, other.ty) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(lhs), Some(rhs)) => (lhs, rhs),
        };
        lhs.rank()
            .cmp(&rhs.rank())
            .then_with(|| self.compare_same_type(lhs, other))
            .then_with(|| self.inclusion.cmp(&other.inclusion))
    }

    fn compare_same_type(&self, ty: Type, other: &Self) -> Ordering {
        match ty {
            Type::Number => compare_raw_bits(
                self.long0,
                NumberType::from_field(self.long1),
                other.long0,
                NumberType::from_field(other.long1),
            ),
            Type::Text => self.compare_text(other),
            Type::Boolean | Type::Date | Type::LocalTime => self.long0.cmp(&other.long0),
            Type::ZonedDateTime => compare_date_time(
                (self.long0, self.long1, self.long2, self.long3),
                (other.long0, other.long1, other.long2, other.long3),
            ),
            Type::LocalDateTime => self
                .long1
                .cmp(&other.long1)
                .then_with(|| self.long0.cmp(&other.long0)),
            Type::ZonedTime => self
                .long0
                .cmp(&other.long0)
                .then_with(|| self.long1.cmp(&other.long1)),
            Type::Duration => (self.long0, self.long1, self.long2, self.long3).cmp(&(
                other.long0,
                other.long1,
                other.long2,
                other.long3,
            )),
            Type::Geometry => self.compare_crs(other).then_with(|| {
                self.long0.cmp(&other.long0).then_with(|| {
                    compare_coordinates(
                        &self.doubles[..self.dimension()],
                        &other.doubles[..other.dimension()],
                    )
                })
            }),
            _ => self.compare_arrays(other),
        }
    }

    fn compare_crs(&self, other: &Self) -> Ordering {
        self.long1
            .cmp(&other.long1)
            .then_with(|| self.long2.cmp(&other.long2))
    }

    fn compare_text(&self, other: &Self) -> Ordering {
        if self.is_highest_text || other.is_highest_text {
            return self.is_highest_text.cmp(&other.is_highest_text);
        }
        let lhs = &self.bytes[..self.bytes_length];
        let rhs = &other.bytes[..other.bytes_length];
        let common = lhs.len().min(rhs.len());
        match lhs[..common].cmp(&rhs[..common]) {
            Ordering::Equal if self.ignore_length || other.ignore_length => Ordering::Equal,
            Ordering::Equal => lhs.len().cmp(&rhs.len()),
            ordering => ordering,
        }
    }

    fn compare_arrays(&self, other: &Self) -> Ordering {
        if self.is_highest_array || other.is_highest_array {
            return self.is_highest_array.cmp(&other.is_highest_array);
        }
        let common = self.array_length.min(other.array_length);
        for index in 0..common {
            let ordering = self.compare_element(index, other, index);
            if ordering.is_ne() {
                return ordering;
            }
        }
        self.array_length.cmp(&other.array_length)
    }

    /// Compare element `i` of this array slot with element `j` of `other`.
    ///
    /// Both slots must hold arrays of the same type.
    pub(super) fn compare_element(&self, i: usize, other: &Self, j: usize) -> Ordering {
        let Some(ty) = self.ty.and_then(Type::element_type) else {
            return Ordering::Equal;
        };
        match ty {
            Type::Number => compare_raw_bits(
                self.long0_array[i],
                NumberType::from_field(self.long1),
                other.long0_array[j],
                NumberType::from_field(other.long1),
            ),
            Type::Text => {
                let lhs = &self.byte_array_array[i];
                let rhs = &other.byte_array_array[j];
                lhs.cmp(rhs)
            }
            Type::Boolean | Type::Date | Type::LocalTime => {
                self.long0_array[i].cmp(&other.long0_array[j])
            }
            Type::ZonedDateTime => compare_date_time(
                (
                    self.long0_array[i],
                    self.long1_array[i],
                    self.long2_array[i],
                    self.long3_array[i],
                ),
                (
                    other.long0_array[j],
                    other.long1_array[j],
                    other.long2_array[j],
                    other.long3_array[j],
                ),
            ),
            Type::LocalDateTime => self.long1_array[i]
                .cmp(&other.long1_array[j])
                .then_with(|| self.long0_array[i].cmp(&other.long0_array[j])),
            Type::ZonedTime => self.long0_array[i]
                .cmp(&other.long0_array[j])
                .then_with(|| self.long1_array[i].cmp(&other.long1_array[j])),
            Type::Duration => (
                self.long0_array[i],
                self.long1_array[i],
                self.long2_array[i],
                self.long3_array[i],
            )
                .cmp(&(
                    other.long0_array[j],
                    other.long1_array[j],
                    other.long2_array[j],
                    other.long3_array[j],
                )),
            Type::Geometry => {
                let lhs_dimension = self.dimension();
                let rhs_dimension = other.dimension();
                self.compare_crs(other).then_with(|| {
                    self.long0_array[i].cmp(&other.long0_array[j]).then_with(|| {
                        compare_coordinates(
                            &self.doubles[i * lhs_dimension..(i + 1) * lhs_dimension],
                            &other.doubles[j * rhs_dimension..(j + 1) * rhs_dimension],
                        )
                    })
                })
            }
            _ => Ordering::Equal,
        }
    }
}

/// Instants first; equal instants order offsets before regions, offsets by
/// seconds and regions by id.
fn compare_date_time(lhs: (i64, i64, i64, i64), rhs: (i64, i64, i64, i64)) -> Ordering {
    let zone = |zone_id: i64, offset: i64| {
        if zone_id < 0 {
            (false, offset)
        } else {
            (true, zone_id)
        }
    };
    lhs.0
        .cmp(&rhs.0)
        .then_with(|| lhs.1.cmp(&rhs.1))
        .then_with(|| zone(lhs.2, lhs.3).cmp(&zone(rhs.2, rhs.3)))
}

fn compare_coordinates(lhs: &[f64], rhs: &[f64]) -> Ordering {
    lhs.iter()
        .zip(rhs)
        .map(|(&l, &r)| compare_doubles(l, r))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| lhs.len().cmp(&rhs.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Inclusion;
    use crate::values::{
        ArrayValue, CoordinateReferenceSystem, DateTimeValue, DurationValue, PointValue,
        TimeZone, Value, ValueGroup,
    };

    fn slot(value: &Value) -> KeyState {
        let mut state = KeyState::new();
        state.write_value(value, Inclusion::Neutral).expect("write");
        state
    }

    fn cmp(lhs: &Value, rhs: &Value) -> Ordering {
        slot(lhs).compare_value_to(&slot(rhs))
    }

    #[test]
    fn test_cross_type_order_follows_rank() {
        let ordered = [
            Value::Double(f64::NAN),
            Value::text(""),
            Value::Boolean(false),
            Value::DateTime(DateTimeValue::new(i64::MIN, 0, TimeZone::Offset(0))),
            Value::Duration(DurationValue::new(i64::MIN, 0, 0, 0)),
            Value::Point(PointValue::new(CoordinateReferenceSystem::Cartesian, vec![0.0, 0.0])),
            Value::Array(ArrayValue::Int(vec![])),
            Value::Array(ArrayValue::Text(vec![])),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(cmp(&pair[0], &pair[1]), Ordering::Less, "{pair:?}");
        }
    }

    #[test]
    fn test_text_order_is_unsigned_bytes() {
        assert_eq!(cmp(&Value::text("a"), &Value::text("b")), Ordering::Less);
        assert_eq!(cmp(&Value::text("ab"), &Value::text("a")), Ordering::Greater);
        assert_eq!(cmp(&Value::text("é"), &Value::text("z")), Ordering::Greater);
        assert_eq!(cmp(&Value::Char('a'), &Value::text("a")), Ordering::Equal);
    }

    #[test]
    fn test_prefix_bounds_enclose_matching_text() {
        let mut low = KeyState::new();
        low.init_as_prefix_low("ab");
        let mut high = KeyState::new();
        high.init_as_prefix_high("ab");

        for text in ["ab", "abc", "ab\u{10FFFF}"] {
            let key = slot(&Value::text(text));
            assert_eq!(low.compare_value_to(&key), Ordering::Less, "{text}");
            assert_eq!(high.compare_value_to(&key), Ordering::Greater, "{text}");
        }
        for text in ["aa", "ac", "a"] {
            let key = slot(&Value::text(text));
            let inside = low.compare_value_to(&key).is_lt() && high.compare_value_to(&key).is_gt();
            assert!(!inside, "{text}");
        }
    }

    #[test]
    fn test_inclusion_breaks_ties() {
        let mut low = KeyState::new();
        low.write_value(&Value::Int(5), Inclusion::Low).expect("write");
        let mut high = KeyState::new();
        high.write_value(&Value::Int(5), Inclusion::High).expect("write");
        let neutral = slot(&Value::Long(5));

        assert_eq!(low.compare_value_to(&neutral), Ordering::Less);
        assert_eq!(high.compare_value_to(&neutral), Ordering::Greater);
    }

    #[test]
    fn test_duration_orders_by_average_length_first() {
        let month = Value::Duration(DurationValue::new(1, 0, 0, 0));
        let thirty_days = Value::Duration(DurationValue::new(0, 30, 0, 0));
        let thirty_one_days = Value::Duration(DurationValue::new(0, 31, 0, 0));
        assert_eq!(cmp(&thirty_days, &month), Ordering::Less);
        assert_eq!(cmp(&thirty_one_days, &month), Ordering::Greater);
    }

    #[test]
    fn test_date_time_zone_tie_break() {
        let offset = Value::DateTime(DateTimeValue::new(10, 0, TimeZone::Offset(3600)));
        let other_offset = Value::DateTime(DateTimeValue::new(10, 0, TimeZone::Offset(-3600)));
        let region = Value::DateTime(DateTimeValue::new(10, 0, TimeZone::Region(0)));
        assert_eq!(cmp(&other_offset, &offset), Ordering::Less);
        assert_eq!(cmp(&offset, &region), Ordering::Less);
        assert_eq!(cmp(&region, &region), Ordering::Equal);
    }

    #[test]
    fn test_arrays_compare_elementwise_then_length() {
        let short = Value::Array(ArrayValue::Int(vec![1, 2]));
        let long = Value::Array(ArrayValue::Long(vec![1, 2, 0]));
        let bigger = Value::Array(ArrayValue::Double(vec![1.5]));
        assert_eq!(cmp(&short, &long), Ordering::Less);
        assert_eq!(cmp(&long, &bigger), Ordering::Less);
    }

    #[test]
    fn test_uninitialized_sorts_first() {
        let empty = KeyState::new();
        let mut lowest = KeyState::new();
        lowest.init_as_lowest(ValueGroup::Unknown);
        assert_eq!(empty.compare_value_to(&lowest), Ordering::Less);
        assert_eq!(empty.compare_value_to(&KeyState::new()), Ordering::Equal);
    }
}
