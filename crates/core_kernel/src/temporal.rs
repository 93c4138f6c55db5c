//! Organization-local time handling
//!
//! Automation fires at fixed local wall-clock hours in the organization's
//! timezone. This module owns the conversion from a calendar date plus a local
//! hour into an absolute UTC instant, including the daylight-saving edge cases,
//! and the `Clock` seam used wherever "now" matters.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid local time {hour:02}:{minute:02}")]
    InvalidLocalTime { hour: u32, minute: u32 },
}

/// Timezone wrapper for organizations
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA zone name such as `Europe/Berlin`
    pub fn parse(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name.trim())
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Converts a UTC datetime to the local timezone
    pub fn to_local(&self, utc: DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.0)
    }

    /// Returns the calendar date in this timezone at the given instant
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        self.to_local(utc).date_naive()
    }

    /// Resolves `date` at `hour:minute` local wall-clock time to a UTC instant
    ///
    /// An ambiguous local time (clocks falling back) resolves to the earlier
    /// instant. A local time that does not exist (clocks springing forward)
    /// resolves to the first valid instant after the gap.
    pub fn at_local_time(
        &self,
        date: NaiveDate,
        hour: u32,
        minute: u32,
    ) -> Result<DateTime<Utc>, TemporalError> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(TemporalError::InvalidLocalTime { hour, minute })?;
        let mut local = date.and_time(time);

        // DST gaps are at most a few hours; probe forward in 15 minute steps.
        for _ in 0..16 {
            match self.0.from_local_datetime(&local) {
                LocalResult::Single(dt) => return Ok(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(earliest, _) => return Ok(earliest.with_timezone(&Utc)),
                LocalResult::None => local += Duration::minutes(15),
            }
        }

        Err(TemporalError::InvalidLocalTime { hour, minute })
    }

    /// Gets the start of day (00:00) in this timezone as UTC
    pub fn start_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>, TemporalError> {
        self.at_local_time(date, 0, 0)
    }

    /// Gets the first instant of the following day in this timezone as UTC
    ///
    /// A date is "passed" once this instant has been reached.
    pub fn end_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>, TemporalError> {
        let next = date
            .succ_opt()
            .ok_or(TemporalError::InvalidLocalTime { hour: 0, minute: 0 })?;
        self.start_of_day(next)
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Source of the current instant
///
/// Injected into the scheduler, worker, and lifecycle service so that delays
/// and due-date checks are deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually controlled clock
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(now) }
    }

    /// Convenience constructor from a UTC calendar timestamp
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let now = Utc
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|guard| *guard).unwrap_or_else(|p| *p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nine_am_new_york_winter() {
        let tz = Timezone::parse("America/New_York").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let at = tz.at_local_time(date, 9, 0).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_spring_forward_gap_moves_past_gap() {
        let tz = Timezone::parse("America/New_York").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        // 02:30 does not exist on this date; first valid instant is 03:00 EDT.
        let at = tz.at_local_time(date, 2, 30).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::at(2024, 1, 1, 0, 0);
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap());
    }
}
