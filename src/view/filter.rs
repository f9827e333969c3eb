use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::task::Task;
use crate::util::dates::{format_date, in_year, month_bounds, parse_local_date};
use crate::util::text::contains_ci;

/// Which tasks a view shows, by due date or focus membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SectionFilter {
    /// Inbox: every task, grouped into date buckets
    #[default]
    All,
    Today,
    Upcoming,
    Past,
    NoDate,
    /// The flat focus queue
    Focus,
    /// Due between `start` and `end`, both inclusive
    DateRange { start: NaiveDate, end: NaiveDate },
    Month { year: i32, month: u32 },
    Year { year: i32 },
}

impl SectionFilter {
    /// Does `task` belong to this section? Only meaningful for the
    /// date-based variants; `All` accepts everything and `Focus` checks the
    /// focus flag.
    pub fn includes(&self, task: &Task, today: NaiveDate) -> bool {
        let bucket = Bucket::of(task, today);
        match self {
            SectionFilter::All => true,
            SectionFilter::Focus => task.is_focused,
            SectionFilter::Today => bucket == Bucket::Today,
            SectionFilter::Upcoming => bucket == Bucket::Upcoming,
            SectionFilter::Past => bucket == Bucket::Past,
            SectionFilter::NoDate => bucket == Bucket::NoDate,
            SectionFilter::DateRange { start, end } => {
                task.due().is_some_and(|d| *start <= d && d <= *end)
            }
            SectionFilter::Month { year, month } => month_bounds(*year, *month)
                .zip(task.due())
                .is_some_and(|((first, last), d)| first <= d && d <= last),
            SectionFilter::Year { year } => task.due().is_some_and(|d| in_year(d, *year)),
        }
    }
}

impl fmt::Display for SectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionFilter::All => write!(f, "all"),
            SectionFilter::Today => write!(f, "today"),
            SectionFilter::Upcoming => write!(f, "upcoming"),
            SectionFilter::Past => write!(f, "past"),
            SectionFilter::NoDate => write!(f, "no-date"),
            SectionFilter::Focus => write!(f, "focus"),
            SectionFilter::DateRange { start, end } => {
                write!(f, "{}..{}", format_date(*start), format_date(*end))
            }
            SectionFilter::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            SectionFilter::Year { year } => write!(f, "{:04}", year),
        }
    }
}

/// Error for unrecognised filter strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} filter: {value}")]
pub struct FilterParseError {
    kind: &'static str,
    value: String,
}

impl FromStr for SectionFilter {
    type Err = FilterParseError;

    /// Accepts the section names plus `START..END`, `YYYY-MM` and `YYYY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FilterParseError {
            kind: "section",
            value: s.to_string(),
        };
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "all" | "inbox" => return Ok(SectionFilter::All),
            "today" => return Ok(SectionFilter::Today),
            "upcoming" => return Ok(SectionFilter::Upcoming),
            "past" | "overdue" => return Ok(SectionFilter::Past),
            "no-date" | "nodate" | "someday" => return Ok(SectionFilter::NoDate),
            "focus" => return Ok(SectionFilter::Focus),
            _ => {}
        }
        if let Some((start, end)) = s.split_once("..") {
            let start = parse_local_date(start).ok_or_else(err)?;
            let end = parse_local_date(end).ok_or_else(err)?;
            return Ok(SectionFilter::DateRange { start, end });
        }
        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [year] if year.len() == 4 => {
                let year = year.parse().map_err(|_| err())?;
                Ok(SectionFilter::Year { year })
            }
            [year, month] if year.len() == 4 => {
                let year = year.parse().map_err(|_| err())?;
                let month: u32 = month.parse().map_err(|_| err())?;
                if !(1..=12).contains(&month) {
                    return Err(err());
                }
                Ok(SectionFilter::Month { year, month })
            }
            _ => Err(err()),
        }
    }
}

/// Filter on completion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Incomplete,
}

impl StatusFilter {
    pub fn allows(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Completed => task.completed,
            StatusFilter::Incomplete => !task.completed,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "completed" | "done" => Ok(StatusFilter::Completed),
            "incomplete" | "open" | "todo" => Ok(StatusFilter::Incomplete),
            _ => Err(FilterParseError {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// Inbox bucket of a task relative to `today`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Past,
    Today,
    Upcoming,
    NoDate,
}

impl Bucket {
    /// Due dates are compared as local calendar dates. A due date that
    /// cannot be parsed counts as no date.
    pub fn of(task: &Task, today: NaiveDate) -> Bucket {
        match task.due() {
            None => Bucket::NoDate,
            Some(d) if d < today => Bucket::Past,
            Some(d) if d == today => Bucket::Today,
            Some(_) => Bucket::Upcoming,
        }
    }
}

/// Case-insensitive search over text, notes and tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    needle: String,
}

impl SearchQuery {
    /// `None` for an absent or blank query
    pub fn parse(raw: Option<&str>) -> Option<SearchQuery> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        Some(SearchQuery {
            needle: raw.to_lowercase(),
        })
    }

    pub fn matches(&self, task: &Task) -> bool {
        contains_ci(&task.text, &self.needle)
            || task
                .notes
                .as_deref()
                .is_some_and(|n| contains_ci(n, &self.needle))
            || task.tags.iter().any(|t| contains_ci(t, &self.needle))
    }
}
