//! Batching periods
//!
//! A period is one calendar day. Its canonical key is `YYYYMMDD`, which is
//! also the name of the period directory on every storage backend and the
//! integer stamped on persisted rows.

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised while interpreting date arguments
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("Invalid date '{0}'. Use dd/mm/yyyy, yyyy-mm-dd, yyyymmdd or a number of days ago")]
    InvalidDate(String),

    #[error("Start date {start} is after end date {end}")]
    InvertedRange { start: Period, end: Period },

    #[error("An end date requires a start date")]
    MissingStart,

    #[error("Use either a single date or a start/end range, not both")]
    ConflictingArguments,
}

/// One calendar day, the unit of batching
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(NaiveDate);

impl Period {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Today, in local time
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Canonical `YYYYMMDD` key
    pub fn key(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// Integer form of the key, e.g. `20190131`
    pub fn as_int(&self) -> i64 {
        self.key().parse().unwrap_or_default()
    }

    /// Inverse of [`Period::as_int`]
    pub fn from_int(value: i64) -> Result<Self, PeriodError> {
        NaiveDate::parse_from_str(&value.to_string(), "%Y%m%d")
            .map(Self)
            .map_err(|_| PeriodError::InvalidDate(value.to_string()))
    }

    /// Human-readable `dd/mm/yyyy` form used in log lines
    pub fn display_date(&self) -> String {
        self.0.format("%d/%m/%Y").to_string()
    }

    /// `yyyy-mm-dd`, the form bound into SQL source queries
    pub fn iso_date(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn next(&self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }

    /// Parse a command-line date relative to `today`.
    ///
    /// Accepts `dd/mm/yyyy`, `yyyy-mm-dd`, `yyyymmdd`, or a short number of
    /// days in the past (`0` is today, `1` yesterday, `10` ten days ago).
    pub fn parse_relative(input: &str, today: Period) -> Result<Self, PeriodError> {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.len() <= 5 && trimmed.chars().all(|c| c.is_ascii_digit())
        {
            let days: u64 = trimmed
                .parse()
                .map_err(|_| PeriodError::InvalidDate(input.to_string()))?;
            return today
                .0
                .checked_sub_days(Days::new(days))
                .map(Self)
                .ok_or_else(|| PeriodError::InvalidDate(input.to_string()));
        }
        trimmed.parse()
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        for format in ["%Y%m%d", "%d/%m/%Y", "%Y-%m-%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                return Ok(Self(date));
            }
        }
        Err(PeriodError::InvalidDate(s.to_string()))
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.key()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Inclusive range of periods, iterated in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRange {
    start: Period,
    end: Period,
}

impl PeriodRange {
    pub fn new(start: Period, end: Period) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(period: Period) -> Self {
        Self {
            start: period,
            end: period,
        }
    }

    /// Resolve the command-line date flags into a range.
    ///
    /// No flag means today only; a start without an end runs up to today.
    pub fn resolve(
        date: Option<Period>,
        start: Option<Period>,
        end: Option<Period>,
        today: Period,
    ) -> Result<Self, PeriodError> {
        match (date, start, end) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(PeriodError::ConflictingArguments),
            (Some(date), None, None) => Ok(Self::single(date)),
            (None, Some(start), Some(end)) => Self::new(start, end),
            (None, Some(start), None) => Self::new(start, today.max(start)),
            (None, None, Some(_)) => Err(PeriodError::MissingStart),
            (None, None, None) => Ok(Self::single(today)),
        }
    }

    pub fn start(&self) -> Period {
        self.start
    }

    pub fn end(&self) -> Period {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end.0 - self.start.0).num_days() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> PeriodIter {
        PeriodIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for PeriodRange {
    type Item = Period;
    type IntoIter = PeriodIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over a [`PeriodRange`]
#[derive(Debug, Clone)]
pub struct PeriodIter {
    next: Option<Period>,
    end: Period,
}

impl Iterator for PeriodIter {
    type Item = Period;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = current.next();
        Some(current)
    }
}
