//! Shared helpers for unit tests.

mod tree;

use std::cmp::Ordering;

use rand::Rng;
use rand::rngs::StdRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::key::{KeyError, Layout};
use crate::storage::cursor::{ReadCursor, WriteCursor};
use crate::values::{
    ArrayValue, CoordinateReferenceSystem, DateTimeValue, DateValue, DurationValue,
    LocalDateTimeValue, LocalTimeValue, NANOS_PER_DAY, PointValue, TimeValue, TimeZone, Value,
};

pub use tree::InMemoryTree;

/// Route `tracing` output through the test harness. Safe to call from every
/// test.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schema_index=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Value stored next to an `i64` key in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestValue(String);

impl TestValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TestValue {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Layout of `i64` keys with string values.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongLayout;

impl Layout<i64, TestValue> for LongLayout {
    fn new_key(&self) -> i64 {
        0
    }

    fn new_value(&self) -> TestValue {
        TestValue::default()
    }

    fn copy_key(&self, from: &i64, into: &mut i64) {
        *into = *from;
    }

    fn copy_value(&self, from: &TestValue, into: &mut TestValue) {
        into.0.clone_from(&from.0);
    }

    fn key_size(&self, _key: &i64) -> usize {
        8
    }

    fn value_size(&self, value: &TestValue) -> usize {
        value.0.len()
    }

    fn write_key(&self, cursor: &mut dyn WriteCursor, key: &i64) {
        cursor.put_i64(*key);
    }

    fn write_value(&self, cursor: &mut dyn WriteCursor, value: &TestValue) {
        cursor.put_bytes(value.0.as_bytes());
    }

    fn read_key(
        &self,
        cursor: &mut dyn ReadCursor,
        into: &mut i64,
        key_size: usize,
    ) -> Result<(), KeyError> {
        if key_size != 8 {
            return Err(KeyError::Corruption(format!("long key of {key_size} bytes")));
        }
        *into = cursor.get_i64()?;
        Ok(())
    }

    fn read_value(
        &self,
        cursor: &mut dyn ReadCursor,
        into: &mut TestValue,
        value_size: usize,
    ) -> Result<(), KeyError> {
        let mut bytes = vec![0; value_size];
        cursor.get_bytes(&mut bytes)?;
        into.0 = String::from_utf8(bytes).map_err(|e| KeyError::Corruption(e.to_string()))?;
        Ok(())
    }

    fn compare(&self, lhs: &i64, rhs: &i64) -> Ordering {
        lhs.cmp(rhs)
    }
}

/// A random indexable value of any type.
///
/// Numbers stay small enough that comparing integers with floating point
/// values is exact, and never NaN.
pub fn random_value(rng: &mut StdRng) -> Value {
    match rng.random_range(0..17) {
        0 => Value::Byte(rng.random()),
        1 => Value::Short(rng.random()),
        2 => Value::Int(rng.random()),
        3 => Value::Long(rng.random_range(-1_000_000_000_000..1_000_000_000_000)),
        4 => Value::Float(f32::from(rng.random_range(-10_000i16..10_000)) / 8.0),
        5 => Value::Double(rng.random_range(-1.0e9..1.0e9)),
        6 => Value::text(&random_text(rng)),
        7 => Value::Char(rng.random_range('a'..='z')),
        8 => Value::Boolean(rng.random()),
        9 => Value::DateTime(random_date_time(rng)),
        10 => Value::LocalDateTime(random_local_date_time(rng)),
        11 => Value::Date(random_date(rng)),
        12 => Value::Time(random_time(rng)),
        13 => Value::LocalTime(random_local_time(rng)),
        14 => Value::Duration(random_duration(rng)),
        15 => Value::Point(random_point(rng)),
        _ => Value::Array(random_array(rng)),
    }
}

fn random_array(rng: &mut StdRng) -> ArrayValue {
    let len = rng.random_range(0..4);
    match rng.random_range(0..10) {
        0 => ArrayValue::Int((0..len).map(|_| rng.random()).collect()),
        1 => ArrayValue::Double((0..len).map(|_| rng.random_range(-1.0e6..1.0e6)).collect()),
        2 => ArrayValue::Text((0..len).map(|_| random_text(rng)).collect()),
        3 => ArrayValue::Char((0..len).map(|_| rng.random_range('a'..='z')).collect()),
        4 => ArrayValue::Boolean((0..len).map(|_| rng.random()).collect()),
        5 => ArrayValue::DateTime((0..len).map(|_| random_date_time(rng)).collect()),
        6 => ArrayValue::Date((0..len).map(|_| random_date(rng)).collect()),
        7 => ArrayValue::Time((0..len).map(|_| random_time(rng)).collect()),
        8 => ArrayValue::Duration((0..len).map(|_| random_duration(rng)).collect()),
        _ => ArrayValue::Point((0..len).map(|_| random_point(rng)).collect()),
    }
}

fn random_text(rng: &mut StdRng) -> String {
    let len = rng.random_range(0..12);
    (0..len).map(|_| rng.random_range('a'..='f')).collect()
}

fn random_zone(rng: &mut StdRng) -> TimeZone {
    if rng.random() {
        TimeZone::Offset(rng.random_range(-18..=18) * 3600)
    } else {
        TimeZone::Region(rng.random_range(1..600))
    }
}

fn random_date_time(rng: &mut StdRng) -> DateTimeValue {
    DateTimeValue::new(
        rng.random_range(-2_000_000_000..2_000_000_000),
        rng.random_range(0..1_000_000_000),
        random_zone(rng),
    )
}

fn random_local_date_time(rng: &mut StdRng) -> LocalDateTimeValue {
    LocalDateTimeValue::new(
        rng.random_range(-2_000_000_000..2_000_000_000),
        rng.random_range(0..1_000_000_000),
    )
}

fn random_date(rng: &mut StdRng) -> DateValue {
    DateValue::new(rng.random_range(-100_000..100_000))
}

fn random_time(rng: &mut StdRng) -> TimeValue {
    TimeValue::new(
        rng.random_range(0..NANOS_PER_DAY),
        rng.random_range(-18..=18) * 3600,
    )
}

fn random_local_time(rng: &mut StdRng) -> LocalTimeValue {
    LocalTimeValue::new(rng.random_range(0..NANOS_PER_DAY))
}

fn random_duration(rng: &mut StdRng) -> DurationValue {
    DurationValue::new(
        rng.random_range(-100..100),
        rng.random_range(-100..100),
        rng.random_range(-1_000_000..1_000_000),
        rng.random_range(0..1_000_000_000),
    )
}

fn random_point(rng: &mut StdRng) -> PointValue {
    let crs = CoordinateReferenceSystem::ALL[rng.random_range(0..CoordinateReferenceSystem::ALL.len())];
    let coordinates = crs
        .envelope()
        .iter()
        .map(|&(min, max)| rng.random_range(min..max))
        .collect();
    PointValue::new(crs, coordinates)
}
