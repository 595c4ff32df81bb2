//! Temporal value kinds.
//!
//! All temporal values are stored in normalized numeric form: instants as
//! epoch seconds plus nanos in UTC, times of day as nanoseconds, dates as
//! epoch days.

/// Seconds in the average month used to order durations (30 days, 10 hours,
/// 30 minutes).
pub const AVG_MONTH_SECONDS: i64 = 2_629_800;

/// Seconds in a day used to order durations.
pub const AVG_DAY_SECONDS: i64 = 86_400;

/// Nanoseconds in one day.
pub const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Flag marking an encoded zone as a region id rather than an offset.
const ZONE_ID_FLAG: i32 = 0x0100_0000;

/// Mask selecting the payload bits of an encoded zone.
const ZONE_ID_MASK: i32 = 0x00FF_FFFF;

/// Bit that is set when a masked offset was negative.
const ZONE_OFFSET_SIGN_BIT: i32 = 0x0080_0000;

/// Time zone of a zoned date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeZone {
    /// Fixed offset from UTC in seconds.
    Offset(i32),
    /// Named region, identified by its id in an external zone table.
    Region(u16),
}

impl TimeZone {
    /// Encode into the 32-bit on-disk form.
    ///
    /// Offsets keep their low 24 bits; region ids are tagged with a flag bit.
    #[must_use]
    #[allow(clippy::cast_lossless)] // From is not const
    pub const fn encode(self) -> i32 {
        match self {
            Self::Offset(seconds) => seconds & ZONE_ID_MASK,
            Self::Region(id) => id as i32 | ZONE_ID_FLAG,
        }
    }

    /// Decode the 32-bit on-disk form.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn decode(encoded: i32) -> Self {
        if encoded & ZONE_ID_FLAG != 0 {
            Self::Region((encoded & ZONE_ID_MASK) as u16)
        } else if encoded & ZONE_OFFSET_SIGN_BIT != 0 {
            Self::Offset(encoded | !ZONE_ID_MASK)
        } else {
            Self::Offset(encoded)
        }
    }
}

/// A date without time or zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateValue {
    pub epoch_day: i64,
}

impl DateValue {
    #[must_use]
    pub const fn new(epoch_day: i64) -> Self {
        Self { epoch_day }
    }
}

/// A time of day without zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalTimeValue {
    pub nano_of_day: i64,
}

impl LocalTimeValue {
    #[must_use]
    pub const fn new(nano_of_day: i64) -> Self {
        Self { nano_of_day }
    }
}

/// A time of day with a UTC offset.
///
/// Stored as the UTC-normalized time, which may fall outside a single day,
/// plus the original offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeValue {
    pub nanos_of_day_utc: i64,
    pub offset_seconds: i32,
}

impl TimeValue {
    #[must_use]
    pub const fn new(nanos_of_day_utc: i64, offset_seconds: i32) -> Self {
        Self {
            nanos_of_day_utc,
            offset_seconds,
        }
    }

    /// Build from a local time of day and its offset.
    #[must_use]
    #[allow(clippy::cast_lossless)] // From is not const
    pub const fn from_local(nano_of_day: i64, offset_seconds: i32) -> Self {
        Self {
            nanos_of_day_utc: nano_of_day - offset_seconds as i64 * 1_000_000_000,
            offset_seconds,
        }
    }
}

/// A date and time without zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalDateTimeValue {
    pub epoch_second: i64,
    pub nano: i32,
}

impl LocalDateTimeValue {
    #[must_use]
    pub const fn new(epoch_second: i64, nano: i32) -> Self {
        Self { epoch_second, nano }
    }
}

/// An instant together with the zone it was expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTimeValue {
    pub epoch_second_utc: i64,
    pub nano: i32,
    pub zone: TimeZone,
}

impl DateTimeValue {
    #[must_use]
    pub const fn new(epoch_second_utc: i64, nano: i32, zone: TimeZone) -> Self {
        Self {
            epoch_second_utc,
            nano,
            zone,
        }
    }
}

/// A calendar-aware amount of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationValue {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanos: i32,
}

impl DurationValue {
    #[must_use]
    pub const fn new(months: i64, days: i64, seconds: i64, nanos: i32) -> Self {
        Self {
            months,
            days,
            seconds,
            nanos,
        }
    }

    /// Total length in seconds using average month and day lengths.
    ///
    /// Saturates instead of overflowing for extreme components.
    #[must_use]
    pub const fn average_seconds(&self) -> i64 {
        self.months
            .saturating_mul(AVG_MONTH_SECONDS)
            .saturating_add(self.days.saturating_mul(AVG_DAY_SECONDS))
            .saturating_add(self.seconds)
    }

    /// Rebuild a duration from its average-seconds form and components.
    #[must_use]
    pub const fn from_average_seconds(
        average_seconds: i64,
        nanos: i32,
        months: i64,
        days: i64,
    ) -> Self {
        let seconds = average_seconds
            .wrapping_sub(months.wrapping_mul(AVG_MONTH_SECONDS))
            .wrapping_sub(days.wrapping_mul(AVG_DAY_SECONDS));
        Self {
            months,
            days,
            seconds,
            nanos,
        }
    }
}
