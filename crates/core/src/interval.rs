//! Calendar recurrence interval.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EnvelopeError;

/// A calendar interval (years, months, days, hours, minutes, seconds).
///
/// Years and months move the calendar month and keep the day-of-month; a day
/// past the end of the target month rolls over into the next one, so Jan 31
/// plus one month is Mar 2 in a leap year. Everything else is a fixed number
/// of seconds. All arithmetic happens in UTC.
///
/// On the wire the interval is written as `P{y}Y{m}M{d}DT{h}H{i}M{s}S`, e.g.
/// `P0Y0M0DT1H0M0S` for one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RecurrenceInterval {
    pub years: u32,
    pub months: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl RecurrenceInterval {
    pub fn new(years: u32, months: u32, days: u32, hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            years,
            months,
            days,
            hours,
            minutes,
            seconds,
        }
    }

    pub fn years(years: u32) -> Self {
        Self { years, ..Self::default() }
    }

    pub fn months(months: u32) -> Self {
        Self { months, ..Self::default() }
    }

    pub fn days(days: u32) -> Self {
        Self { days, ..Self::default() }
    }

    pub fn hours(hours: u32) -> Self {
        Self { hours, ..Self::default() }
    }

    pub fn minutes(minutes: u32) -> Self {
        Self { minutes, ..Self::default() }
    }

    pub fn seconds(seconds: u32) -> Self {
        Self { seconds, ..Self::default() }
    }

    /// True when adding the interval would not move a timestamp.
    pub fn is_zero(&self) -> bool {
        self.calendar_months() == 0 && self.clock_seconds() == 0
    }

    /// Length in seconds when the interval has no calendar component.
    pub fn fixed_seconds(&self) -> Option<i64> {
        (self.calendar_months() == 0).then(|| self.clock_seconds())
    }

    /// `at + self`, or `None` when the result leaves chrono's range.
    pub fn add_to(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.add_times(at, 1)
    }

    /// `at + times * self`, each component scaled before the day rollover
    /// is applied once.
    pub fn add_times(&self, at: DateTime<Utc>, times: u32) -> Option<DateTime<Utc>> {
        let times = i64::from(times);
        let months = self.calendar_months().checked_mul(times)?;
        let clock = self.clock_seconds().checked_mul(times)?;

        let date = at.date_naive();
        let month_index = i64::from(date.year())
            .checked_mul(12)?
            .checked_add(i64::from(date.month0()))?
            .checked_add(months)?;
        let year = i32::try_from(month_index.div_euclid(12)).ok()?;
        let month = u32::try_from(month_index.rem_euclid(12)).ok()? + 1;

        let overflowed = NaiveDate::from_ymd_opt(year, month, 1)?
            .checked_add_signed(Duration::try_days(i64::from(date.day0()))?)?;
        overflowed
            .and_time(at.time())
            .and_utc()
            .checked_add_signed(Duration::try_seconds(clock)?)
    }

    fn calendar_months(&self) -> i64 {
        i64::from(self.years) * 12 + i64::from(self.months)
    }

    fn clock_seconds(&self) -> i64 {
        i64::from(self.days) * 86_400
            + i64::from(self.hours) * 3_600
            + i64::from(self.minutes) * 60
            + i64::from(self.seconds)
    }
}

impl fmt::Display for RecurrenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}Y{}M{}DT{}H{}M{}S",
            self.years, self.months, self.days, self.hours, self.minutes, self.seconds
        )
    }
}

impl FromStr for RecurrenceInterval {
    type Err = EnvelopeError;

    /// Parses ISO-8601 durations such as `PT1H`, `P1D`, `P2W` or
    /// `P1Y2M3DT4H5M6S`. Fractions and signs are not supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnvelopeError::InvalidInterval(s.to_string());

        let body = s.strip_prefix('P').ok_or_else(invalid)?;
        if body.is_empty() {
            return Err(invalid());
        }

        let mut interval = Self::default();
        let mut in_time = false;
        let mut digits = String::new();
        let mut seen_component = false;

        for c in body.chars() {
            match c {
                '0'..='9' => digits.push(c),
                'T' if !in_time && digits.is_empty() => in_time = true,
                _ => {
                    if digits.is_empty() {
                        return Err(invalid());
                    }
                    let amount: u32 = digits.parse().map_err(|_| invalid())?;
                    digits.clear();
                    seen_component = true;

                    let slot = match (in_time, c) {
                        (false, 'Y') => &mut interval.years,
                        (false, 'M') => &mut interval.months,
                        (false, 'W') => {
                            interval.days = interval
                                .days
                                .checked_add(amount.checked_mul(7).ok_or_else(invalid)?)
                                .ok_or_else(invalid)?;
                            continue;
                        }
                        (false, 'D') => &mut interval.days,
                        (true, 'H') => &mut interval.hours,
                        (true, 'M') => &mut interval.minutes,
                        (true, 'S') => &mut interval.seconds,
                        _ => return Err(invalid()),
                    };
                    *slot = amount;
                }
            }
        }

        if !digits.is_empty() || !seen_component {
            return Err(invalid());
        }

        Ok(interval)
    }
}

impl Serialize for RecurrenceInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecurrenceInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
