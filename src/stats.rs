// Statistics queries and the hierarchical paths they map to.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::PandoraError;

/// Granularity at which statistics are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Year,
    Month,
    Week,
    Day,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Year => "year",
            Interval::Month => "month",
            Interval::Week => "week",
            Interval::Day => "day",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = PandoraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Interval::Year),
            "month" => Ok(Interval::Month),
            "week" => Ok(Interval::Week),
            "day" => Ok(Interval::Day),
            other => Err(PandoraError::InvalidInterval(other.to_string())),
        }
    }
}

/// A statistics window: an interval plus the components that pin it down.
/// Missing components let the server default to the current period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub interval: Interval,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub day: Option<u32>,
}

impl StatsQuery {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            year: None,
            month: None,
            week: None,
            day: None,
        }
    }

    /// Same as [`StatsQuery::new`] from an interval name.
    pub fn parse(interval: &str) -> Result<Self, PandoraError> {
        Ok(Self::new(interval.parse()?))
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn week(mut self, week: u32) -> Self {
        self.week = Some(week);
        self
    }

    pub fn day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    /// Populate every component from `date`, overriding what was set.
    /// The week is the ISO week number.
    pub fn date(mut self, date: NaiveDate) -> Self {
        self.year = Some(date.year());
        self.month = Some(date.month());
        self.week = Some(date.iso_week().week());
        self.day = Some(date.day());
        self
    }

    /// Path segments after the prefix: the interval name, then the most
    /// specific component and coarser ones for as long as they are set.
    pub fn segments(&self) -> Vec<String> {
        let year = self.year.map(|y| y.to_string());
        let month = self.month.map(|m| m.to_string());
        let week = self.week.map(|w| w.to_string());
        let day = self.day.map(|d| d.to_string());

        let components = match self.interval {
            Interval::Year => vec![year],
            Interval::Month => vec![month, year],
            Interval::Week => vec![week, year],
            Interval::Day => vec![day, month, year],
        };

        let mut segments = vec![self.interval.as_str().to_string()];
        push_while_present(&mut segments, components);
        segments
    }
}

/// Append `components` in order, stopping at the first missing one.
pub(crate) fn push_while_present<I>(segments: &mut Vec<String>, components: I)
where
    I: IntoIterator<Item = Option<String>>,
{
    segments.extend(components.into_iter().map_while(|c| c));
}
