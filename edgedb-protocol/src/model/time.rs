use std::fmt;

/// A point in time, stored as microseconds since 2000-01-01T00:00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Datetime {
    pub(crate) micros: i64,
}

/// A calendar date and wall-clock time without a timezone, stored as
/// microseconds since 2000-01-01T00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDatetime {
    pub(crate) micros: i64,
}

/// A calendar date, stored as days since 2000-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDate {
    pub(crate) days: i32,
}

/// A wall-clock time, stored as microseconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalTime {
    pub(crate) micros: u64,
}

/// A time interval, stored as microseconds. The wire format reserves day
/// and month components; this driver requires them to be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    pub(crate) micros: i64,
}

pub(crate) const MICROS_PER_DAY: u64 = 86_400 * 1_000_000;

impl Datetime {
    pub fn from_postgres_micros(micros: i64) -> Datetime {
        Datetime { micros }
    }
    /// Microseconds since 2000-01-01T00:00:00 UTC.
    pub fn postgres_micros(self) -> i64 {
        self.micros
    }
    /// Microseconds since the unix epoch.
    pub fn unix_micros(self) -> i64 {
        self.micros + POSTGRES_EPOCH_UNIX_MICROS
    }
    pub fn from_unix_micros(micros: i64) -> Datetime {
        Datetime {
            micros: micros - POSTGRES_EPOCH_UNIX_MICROS,
        }
    }
}

// 2000-01-01T00:00:00 UTC relative to the unix epoch.
const POSTGRES_EPOCH_UNIX_MICROS: i64 = 946_684_800 * 1_000_000;

impl LocalDatetime {
    pub fn from_postgres_micros(micros: i64) -> LocalDatetime {
        LocalDatetime { micros }
    }
    pub fn postgres_micros(self) -> i64 {
        self.micros
    }
}

impl LocalDate {
    pub fn from_postgres_days(days: i32) -> LocalDate {
        LocalDate { days }
    }
    pub fn postgres_days(self) -> i32 {
        self.days
    }
}

impl LocalTime {
    /// Microseconds since midnight; values at or past 24:00 are rejected.
    pub fn try_from_micros(micros: u64) -> Result<LocalTime, super::OutOfRangeError> {
        if micros < MICROS_PER_DAY {
            Ok(LocalTime { micros })
        } else {
            Err(super::OutOfRangeError)
        }
    }
    pub fn micros(self) -> u64 {
        self.micros
    }
}

impl Duration {
    pub fn from_micros(micros: i64) -> Duration {
        Duration { micros }
    }
    pub fn micros(self) -> i64 {
        self.micros
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let negative = self.micros < 0;
        let abs = self.micros.unsigned_abs();
        let (secs, micros) = (abs / 1_000_000, abs % 1_000_000);
        if negative {
            write!(f, "-")?;
        }
        if micros != 0 {
            let mut micros = micros;
            let mut width = 6;
            while micros % 10 == 0 {
                micros /= 10;
                width -= 1;
            }
            write!(f, "{}.{:0width$}s", secs, micros, width = width)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

#[cfg(feature = "with-chrono")]
mod chrono_interop {
    use super::*;
    use crate::model::OutOfRangeError;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

    fn postgres_epoch() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    impl TryFrom<Datetime> for DateTime<Utc> {
        type Error = OutOfRangeError;
        fn try_from(value: Datetime) -> Result<DateTime<Utc>, Self::Error> {
            postgres_epoch()
                .checked_add_signed(TimeDelta::microseconds(value.micros))
                .map(|naive| naive.and_utc())
                .ok_or(OutOfRangeError)
        }
    }

    impl TryFrom<DateTime<Utc>> for Datetime {
        type Error = OutOfRangeError;
        fn try_from(value: DateTime<Utc>) -> Result<Datetime, Self::Error> {
            value
                .naive_utc()
                .signed_duration_since(postgres_epoch())
                .num_microseconds()
                .map(|micros| Datetime { micros })
                .ok_or(OutOfRangeError)
        }
    }

    impl TryFrom<LocalDatetime> for NaiveDateTime {
        type Error = OutOfRangeError;
        fn try_from(value: LocalDatetime) -> Result<NaiveDateTime, Self::Error> {
            postgres_epoch()
                .checked_add_signed(TimeDelta::microseconds(value.micros))
                .ok_or(OutOfRangeError)
        }
    }

    impl TryFrom<LocalDate> for NaiveDate {
        type Error = OutOfRangeError;
        fn try_from(value: LocalDate) -> Result<NaiveDate, Self::Error> {
            postgres_epoch()
                .date()
                .checked_add_signed(TimeDelta::days(value.days as i64))
                .ok_or(OutOfRangeError)
        }
    }

    impl TryFrom<LocalTime> for NaiveTime {
        type Error = OutOfRangeError;
        fn try_from(value: LocalTime) -> Result<NaiveTime, Self::Error> {
            NaiveTime::from_num_seconds_from_midnight_opt(
                (value.micros / 1_000_000) as u32,
                ((value.micros % 1_000_000) * 1000) as u32,
            )
            .ok_or(OutOfRangeError)
        }
    }
}
