//! Pure calendar arithmetic on local dates.
//!
//! Every value here is a wall-calendar date or wall-clock time with no
//! timezone attached. A roster entry for `2025-01-06` means that calendar
//! day wherever the station is, so nothing in this module ever converts
//! through a UTC instant.
//!
//! # Functions
//!
//! - [`parse_local_date`] / [`format_local_date`]: strict `YYYY-MM-DD`
//! - [`parse_local_time`] / [`format_local_time`]: `HH:MM` wall-clock times
//! - [`advance_by_days`] / [`advance_by_months`]: date stepping
//! - [`weekday_index`]: weekday as 0 (Sunday) through 6 (Saturday)

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

use crate::error::AvailabilityError;

// ── Dates ───────────────────────────────────────────────────────────────────

/// Parse a `YYYY-MM-DD` string as a calendar date.
///
/// Only the zero-padded form is accepted: `"2025-1-6"` is rejected so that
/// formatting a parsed date always reproduces its input.
///
/// # Errors
///
/// Returns [`AvailabilityError::InvalidDateFormat`] if the string is not
/// exactly ten characters of the form `YYYY-MM-DD` or names a day that does
/// not exist (e.g. `2025-02-30`).
///
/// # Examples
///
/// ```
/// use availability_engine::calendar::{format_local_date, parse_local_date};
///
/// let date = parse_local_date("2025-01-06").unwrap();
/// assert_eq!(format_local_date(date), "2025-01-06");
/// ```
pub fn parse_local_date(s: &str) -> Result<NaiveDate, AvailabilityError> {
    let invalid = || AvailabilityError::InvalidDateFormat(s.to_string());

    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(invalid());
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return Err(invalid());
    }

    let year: i32 = s[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = s[5..7].parse().map_err(|_| invalid())?;
    let day: u32 = s[8..10].parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Format a date as zero-padded `YYYY-MM-DD`.
pub fn format_local_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Step a date forward (or backward, for negative `n`) by whole days.
///
/// Returns `None` only when the result falls outside chrono's supported
/// calendar range.
pub fn advance_by_days(date: NaiveDate, n: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(n))
}

/// Step a date by whole months, clamping to the last day of short months.
///
/// `2025-01-31` advanced by one month is `2025-02-28`; by two months it is
/// `2025-03-31`, because the day is re-derived from the input each time
/// rather than carried over from the clamped intermediate.
///
/// # Examples
///
/// ```
/// use availability_engine::calendar::{advance_by_months, parse_local_date};
///
/// let jan31 = parse_local_date("2025-01-31").unwrap();
/// assert_eq!(advance_by_months(jan31, 1), parse_local_date("2025-02-28").ok());
/// assert_eq!(advance_by_months(jan31, 2), parse_local_date("2025-03-31").ok());
/// ```
pub fn advance_by_months(date: NaiveDate, n: i32) -> Option<NaiveDate> {
    month_with_day(date.year(), date.month(), n, date.day())
}

/// The date `n` months after `year`/`month`, on `day` clamped to month length.
pub(crate) fn month_with_day(year: i32, month: u32, n: i32, day: u32) -> Option<NaiveDate> {
    let total = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(n);
    let target_year = i32::try_from(total.div_euclid(12)).ok()?;
    let target_month = (total.rem_euclid(12) + 1) as u32;
    let clamped = day.min(days_in_month(target_year, target_month));
    NaiveDate::from_ymd_opt(target_year, target_month, clamped)
}

/// Number of days in the given month (1-12) of the given year.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if NaiveDate::from_ymd_opt(year, 2, 29).is_some() => 29,
        2 => 28,
        _ => 31,
    }
}

// ── Weekdays ────────────────────────────────────────────────────────────────

/// Weekday of `date` as 0 (Sunday) through 6 (Saturday).
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// First date on or after `date` whose [`weekday_index`] equals `index`.
///
/// `index` is taken modulo 7.
pub fn next_weekday_on_or_after(date: NaiveDate, index: u8) -> Option<NaiveDate> {
    let current = i64::from(weekday_index(date));
    let target = i64::from(index % 7);
    advance_by_days(date, (target - current).rem_euclid(7))
}

// ── Times ───────────────────────────────────────────────────────────────────

/// Parse a wall-clock time given as `HH:MM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns [`AvailabilityError::InvalidTimeFormat`] for anything else,
/// including out-of-range components like `24:00`.
pub fn parse_local_time(s: &str) -> Result<NaiveTime, AvailabilityError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| AvailabilityError::InvalidTimeFormat(s.to_string()))
}

/// Format a wall-clock time as `HH:MM`, or `HH:MM:SS` when seconds are set.
pub fn format_local_time(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
