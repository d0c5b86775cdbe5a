//! Periods and the normalization rules that map a requested period onto the
//! period a variable is defined over.
//!
//! A [`Period`] is a start date plus a granularity. Variables declare the
//! granularity they live at (their definition unit); every request is passed
//! through [`Period::normalize`] before the ledger is consulted, so asking for
//! `marie` on 2011-06-15 and on the year 2011 hits the same holder.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Cannot parse period '{0}' (expected YYYY, YYYY-MM, YYYY-MM-DD or 'eternity')")]
    Unparsable(String),
    #[error("Date out of range: {year:04}-{month:02}-{day:02}")]
    OutOfRange { year: i32, month: u32, day: u32 },
}

/// The granularity of a period, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Day,
    Month,
    Year,
    /// Permanent values that do not vary with time (birth dates, identifiers).
    Eternity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    unit: PeriodUnit,
    start: NaiveDate,
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate, PeriodError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(PeriodError::OutOfRange { year, month, day })
}

impl Period {
    pub fn year(year: i32) -> Result<Self, PeriodError> {
        Ok(Self { unit: PeriodUnit::Year, start: date(year, 1, 1)? })
    }

    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        Ok(Self { unit: PeriodUnit::Month, start: date(year, month, 1)? })
    }

    pub fn day(day: NaiveDate) -> Self {
        Self { unit: PeriodUnit::Day, start: day }
    }

    pub fn eternity() -> Self {
        Self { unit: PeriodUnit::Eternity, start: NaiveDate::MIN }
    }

    /// The calendar year containing `day`.
    pub fn year_of(day: NaiveDate) -> Self {
        Self { unit: PeriodUnit::Year, start: first_of_year(day) }
    }

    /// The calendar month containing `day`.
    pub fn month_of(day: NaiveDate) -> Self {
        Self { unit: PeriodUnit::Month, start: first_of_month(day) }
    }

    pub fn unit(&self) -> PeriodUnit { self.unit }
    pub fn start(&self) -> NaiveDate { self.start }

    /// Last day covered by the period (inclusive).
    pub fn stop(&self) -> NaiveDate {
        match self.unit {
            PeriodUnit::Day => self.start,
            PeriodUnit::Month => last_of_month(self.start),
            PeriodUnit::Year => NaiveDate::from_ymd_opt(self.start.year(), 12, 31).unwrap_or(NaiveDate::MAX),
            PeriodUnit::Eternity => NaiveDate::MAX,
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.stop()
    }

    /// Maps this period onto the canonical period of the given unit.
    ///
    /// The start instant is floored to the first day of its month, then widened
    /// to the enclosing calendar year when `unit` is `Year`. Any request for a
    /// permanent variable collapses to [`Period::eternity`].
    pub fn normalize(self, unit: PeriodUnit) -> Period {
        match unit {
            PeriodUnit::Eternity => Period::eternity(),
            PeriodUnit::Day => Period::day(self.start),
            PeriodUnit::Month => Period::month_of(self.start),
            PeriodUnit::Year => Period::year_of(first_of_month(self.start)),
        }
    }
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn first_of_year(day: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(day.year(), 1, 1).unwrap_or(day)
}

fn last_of_month(day: NaiveDate) -> NaiveDate {
    let (y, m) = if day.month() == 12 { (day.year() + 1, 1) } else { (day.year(), day.month() + 1) };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            PeriodUnit::Eternity => write!(f, "eternity"),
            PeriodUnit::Year => write!(f, "{:04}", self.start.year()),
            PeriodUnit::Month => write!(f, "{:04}-{:02}", self.start.year(), self.start.month()),
            PeriodUnit::Day => write!(f, "{}", self.start.format("%Y-%m-%d")),
        }
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("eternity") {
            return Ok(Period::eternity());
        }
        let bad = || PeriodError::Unparsable(s.to_string());
        let parts: Vec<&str> = s.split('-').collect();
        let num = |p: &str| p.parse::<u32>().map_err(|_| bad());
        match parts.as_slice() {
            [y] if y.len() == 4 => Period::year(num(y)? as i32),
            [y, m] if y.len() == 4 => Period::month(num(y)? as i32, num(m)?),
            [y, m, d] if y.len() == 4 => Ok(Period::day(date(num(y)? as i32, num(m)?, num(d)?)?)),
            _ => Err(bad()),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Period> for String {
    fn from(p: Period) -> Self { p.to_string() }
}
