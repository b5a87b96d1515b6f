//! `DD-MM-YYYY` date codec and the clock used for staleness checks.
//!
//! Upstream NAV records and the watermark file both carry dates as
//! `DD-MM-YYYY` strings. Everything inside the pipeline works on
//! `NaiveDate`; these helpers are the only place the string form is handled.

use chrono::NaiveDate;
use thiserror::Error;

/// Wire format used by the NAV API and the watermark file.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid date '{value}': expected DD-MM-YYYY")]
    Invalid { value: String },
}

/// Parse a `DD-MM-YYYY` string.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| DateError::Invalid {
        value: value.to_string(),
    })
}

/// Format a date as `DD-MM-YYYY`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Whole days between `date` and `today` (positive when `date` is in the past).
pub fn day_gap(today: NaiveDate, date: NaiveDate) -> i64 {
    (today - date).num_days()
}

/// Source of "today" for staleness decisions.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock pinned to one date (tests, replays).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
