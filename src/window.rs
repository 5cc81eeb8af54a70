//! Date windows.
//!
//! The time series endpoint refuses ranges longer than 730 days, so a longer
//! request is sliced into consecutive windows that each fit.

use std::fmt;

use chrono::{NaiveDate, TimeDelta};

use crate::error::{Error, Result};

/// Longest span, `end - start`, the time series endpoint accepts.
pub const MAX_SPAN_DAYS: u32 = 730;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive date range with `end >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "window end {end} is before its start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Days from `start` to `end`.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Slices this window into windows of at most `max_span_days`.
    pub fn split(&self, max_span_days: u32) -> Windows {
        split(self.start, self.end, max_span_days)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Ordered, gap-free windows covering `start..=end`.
///
/// Each window spans exactly `max_span_days` except the last, which ends on
/// `end`. A range that already fits yields itself. `end < start` yields nothing.
pub fn split(start: NaiveDate, end: NaiveDate, max_span_days: u32) -> Windows {
    Windows {
        cursor: (start <= end).then_some(start),
        end,
        max_span: TimeDelta::days(i64::from(max_span_days)),
    }
}

/// Iterator returned by [`split`]. Clone it to walk the windows again.
#[derive(Debug, Clone)]
pub struct Windows {
    cursor: Option<NaiveDate>,
    end: NaiveDate,
    max_span: TimeDelta,
}

impl Iterator for Windows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let start = self.cursor?;
        if self.end - start <= self.max_span {
            self.cursor = None;
            return Some(DateWindow {
                start,
                end: self.end,
            });
        }

        let end = start + self.max_span;
        self.cursor = end.succ_opt();
        Some(DateWindow { start, end })
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        Error::InvalidInput(format!(
            "date '{value}' is not in the format yyyy-mm-dd"
        ))
    })
}

/// Parses and checks a user supplied date range against `today`.
///
/// Rules: both dates given, `from < to`, `from <= today`, `to <= today + 1 day`.
pub fn validate_range(
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> Result<DateWindow> {
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (parse_date(from)?, parse_date(to)?),
        _ => {
            return Err(Error::InvalidInput(
                "you must specify both a from date and a to date".to_string(),
            ));
        }
    };

    if from > to {
        return Err(Error::InvalidInput(format!(
            "from date {from} cannot be after to date {to}"
        )));
    }
    if from == to {
        return Err(Error::InvalidInput(format!(
            "from date and to date cannot both be {from}"
        )));
    }
    if from > today {
        return Err(Error::InvalidInput(format!(
            "from date {from} cannot be after today ({today})"
        )));
    }
    if to > today + TimeDelta::days(1) {
        return Err(Error::InvalidInput(format!(
            "to date {to} cannot be later than one day after today ({today})"
        )));
    }

    Ok(DateWindow { start: from, end: to })
}
