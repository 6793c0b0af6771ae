//! Time-base reconciliation between CXC seconds and calendar date strings.
//!
//! Both encodings are mapped onto plot dates: continuous days counted so that
//! 0001-01-01T00:00:00 UTC is day 1.0 and 1970-01-01T00:00:00 UTC is day
//! 719163.0. A [`NormalizedTime`] keeps the whole day separate from the
//! fraction of the day so that microsecond instants survive a round trip.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use ndarray::Array1;

use crate::RzError;

pub const SECONDS_PER_DAY: f64 = 86_400.0;
const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// Seconds between 1970-01-01T00:00:00 and the CXC epoch, 1998-01-01T00:00:00.
pub const CXC_EPOCH_UNIX_SECONDS: f64 = 883_612_800.0;

/// Plot date of 1970-01-01T00:00:00.
pub const UNIX_EPOCH_PLOT_DATE: i64 = 719_163;

/// Largest CXC time magnitude accepted from a table, roughly 3,000 years either
/// side of the epoch.
pub const MAX_CXC_SECONDS: f64 = 1.0e11;
const EXACT_DAY_LIMIT: f64 = 9.0e15;

/// `chrono` pattern for `YYYY:DOY:HH:MM:SS.ffffff`.
pub const CALENDAR_FORMAT: &str = "%Y:%j:%H:%M:%S%.6f";
const CALENDAR_LEN: usize = 24;
const CALENDAR_SEPARATORS: [(usize, u8); 5] = [(4, b':'), (8, b':'), (11, b':'), (14, b':'), (17, b'.')];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedTime {
    day: i64,
    fraction: f64,
}

impl NormalizedTime {
    /// Build from a whole plot-date day and a (possibly out of range) day fraction.
    pub fn from_parts(day: i64, fraction: f64) -> Self {
        let carry = fraction.floor();
        let mut day = day.saturating_add(carry as i64);
        let mut fraction = fraction - carry;
        // fraction - floor(fraction) rounds up to 1.0 for tiny negative inputs
        if fraction >= 1.0 {
            day = day.saturating_add(1);
            fraction -= 1.0;
        }
        Self { day, fraction }
    }

    pub fn from_days(days: f64) -> Self {
        Self::from_parts(0, days)
    }

    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let day = i64::from(dt.date().num_days_from_ce());
        let micros = i64::from(dt.num_seconds_from_midnight()) * 1_000_000
            + i64::from(dt.nanosecond() / 1_000);
        Self::from_parts(day, micros as f64 / MICROS_PER_DAY)
    }

    /// Continuous plot-date value used on the chart axis.
    pub fn days(&self) -> f64 {
        self.day as f64 + self.fraction
    }

    pub fn whole_days(&self) -> i64 {
        self.day
    }

    pub fn day_fraction(&self) -> f64 {
        self.fraction
    }

    pub fn offset_days(self, days: f64) -> Self {
        Self::from_parts(self.day, self.fraction + days)
    }

    pub fn offset_seconds(self, seconds: f64) -> Self {
        self.offset_days(seconds / SECONDS_PER_DAY)
    }

    /// Signed distance in days from `earlier` to `self`.
    pub fn days_since(&self, earlier: &NormalizedTime) -> f64 {
        (self.day - earlier.day) as f64 + (self.fraction - earlier.fraction)
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_num_days_from_ce_opt(i32::try_from(self.day).ok()?)?;
        let micros = (self.fraction * MICROS_PER_DAY).round() as i64;
        Some(date.and_hms_opt(0, 0, 0)? + Duration::microseconds(micros))
    }

    /// Inverse of [`parse_calendar`], rounded to the microsecond.
    pub fn format_calendar(&self) -> Option<String> {
        self.to_datetime()
            .map(|dt| dt.format(CALENDAR_FORMAT).to_string())
    }
}

impl PartialOrd for NormalizedTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.day.cmp(&other.day) {
            Ordering::Equal => self.fraction.partial_cmp(&other.fraction),
            ord => Some(ord),
        }
    }
}

impl fmt::Display for NormalizedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format_calendar() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{:.6}", self.days()),
        }
    }
}

/// Unix seconds to plot date.
pub fn epoch_to_plot_date(unix_seconds: f64) -> NormalizedTime {
    let whole = (unix_seconds / SECONDS_PER_DAY).floor();
    // past 2^53 days the split below loses the day boundary; NaN saturates high
    if whole.is_nan() || whole.abs() >= EXACT_DAY_LIMIT {
        let day = if whole < 0.0 { i64::MIN } else { i64::MAX };
        return NormalizedTime::from_parts(day, 0.0);
    }
    let remainder = unix_seconds - whole * SECONDS_PER_DAY;
    NormalizedTime::from_parts(
        UNIX_EPOCH_PLOT_DATE.saturating_add(whole as i64),
        remainder / SECONDS_PER_DAY,
    )
}

/// Reject CXC times that are not finite or lie outside [`MAX_CXC_SECONDS`].
pub fn check_cxc_seconds(cxc_seconds: f64) -> Result<f64, String> {
    if !cxc_seconds.is_finite() {
        return Err(format!("'{}' is not a finite time", cxc_seconds));
    }
    if cxc_seconds.abs() > MAX_CXC_SECONDS {
        return Err(format!(
            "{:e} s is outside the supported range of +/-{:e} s",
            cxc_seconds, MAX_CXC_SECONDS
        ));
    }
    Ok(cxc_seconds)
}

/// Full conversion of a single CXC timestamp.
pub fn cxc_to_plot_date(cxc_seconds: f64) -> NormalizedTime {
    epoch_to_plot_date(CXC_EPOCH_UNIX_SECONDS + cxc_seconds)
}

/// Convert a CXC time column to plot dates.
///
/// Only the first sample goes through the epoch conversion; every other sample
/// is placed relative to it, `start + (t - t0) / 86400`.
pub fn cxc_to_plot_dates(raw: &Array1<f64>) -> Vec<NormalizedTime> {
    let Some(&first) = raw.first() else {
        return Vec::new();
    };
    let start = cxc_to_plot_date(first);
    let relative_days = (raw - first) / SECONDS_PER_DAY;
    relative_days
        .iter()
        .map(|&days| start.offset_days(days))
        .collect()
}

/// Parse a `YYYY:DOY:HH:MM:SS.ffffff` string into a plot date.
pub fn parse_calendar(value: &str) -> Result<NormalizedTime, RzError> {
    check_calendar_shape(value)?;
    let dt = NaiveDateTime::parse_from_str(value, CALENDAR_FORMAT).map_err(|e| {
        malformed(value, format!("not a valid calendar instant ({})", e))
    })?;
    if dt.nanosecond() >= 1_000_000_000 {
        return Err(malformed(value, "leap seconds are not supported".into()));
    }
    Ok(NormalizedTime::from_datetime(&dt))
}

fn check_calendar_shape(value: &str) -> Result<(), RzError> {
    let bytes = value.as_bytes();
    if bytes.len() != CALENDAR_LEN {
        return Err(malformed(
            value,
            format!(
                "expected {} characters in YYYY:DOY:HH:MM:SS.ffffff, found {}",
                CALENDAR_LEN,
                bytes.len()
            ),
        ));
    }
    for (pos, &byte) in bytes.iter().enumerate() {
        let separator = CALENDAR_SEPARATORS
            .iter()
            .find(|(at, _)| *at == pos)
            .map(|(_, sep)| *sep);
        match separator {
            Some(expected) if byte != expected => {
                return Err(malformed(
                    value,
                    format!(
                        "expected '{}' at position {}, found '{}'",
                        expected as char,
                        pos + 1,
                        byte as char
                    ),
                ));
            }
            None if !byte.is_ascii_digit() => {
                return Err(malformed(
                    value,
                    format!("non-numeric '{}' at position {}", byte as char, pos + 1),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn malformed(value: &str, reason: String) -> RzError {
    RzError::MalformedTimestamp {
        value: value.to_string(),
        reason,
    }
}
