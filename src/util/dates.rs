use std::sync::LazyLock;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;

static PLAIN_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{4})-(\d{1,2})-(\d{1,2})\s*$").expect("valid date regex"));

/// Parse a stored `YYYY-MM-DD` due date into a local calendar date.
///
/// The date is built from its three numeric components, so there is no
/// timezone conversion and no chance of landing on the neighbouring day.
pub fn parse_local_date(s: &str) -> Option<NaiveDate> {
    let caps = PLAIN_DATE.captures(s)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Canonical storage form of a calendar date
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Today's date on the local clock
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Resolve user input into a storable due date string.
///
/// Accepts `YYYY-MM-DD`, `today`, `tomorrow`, `yesterday`, and `+N` (days
/// from `today`). Returns `None` for anything else.
pub fn resolve_due_input(input: &str, today: NaiveDate) -> Option<String> {
    let input = input.trim();
    let date = match input.to_ascii_lowercase().as_str() {
        "today" => today,
        "tomorrow" => today.succ_opt()?,
        "yesterday" => today.pred_opt()?,
        s if s.starts_with('+') => {
            let days: u64 = s[1..].parse().ok()?;
            today.checked_add_days(chrono::Days::new(days))?
        }
        _ => parse_local_date(input)?,
    };
    Some(format_date(date))
}

/// First and last day of a calendar month
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// True when `date` falls in the given year
pub fn in_year(date: NaiveDate, year: i32) -> bool {
    date.year() == year
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_plain_dates() {
        assert_eq!(parse_local_date("2024-01-15"), Some(d(2024, 1, 15)));
        assert_eq!(parse_local_date("2024-1-5"), Some(d(2024, 1, 5)));
        assert_eq!(parse_local_date(" 2024-12-31 "), Some(d(2024, 12, 31)));
    }

    #[test]
    fn rejects_timestamps_and_impossible_dates() {
        assert_eq!(parse_local_date("2024-01-15T00:00:00Z"), None);
        assert_eq!(parse_local_date("2024-02-30"), None);
        assert_eq!(parse_local_date(""), None);
        assert_eq!(parse_local_date("15/01/2024"), None);
    }

    #[test]
    fn format_is_zero_padded() {
        assert_eq!(format_date(d(2024, 3, 7)), "2024-03-07");
    }

    #[test]
    fn resolves_relative_input() {
        let today = d(2024, 1, 31);
        assert_eq!(resolve_due_input("today", today).as_deref(), Some("2024-01-31"));
        assert_eq!(resolve_due_input("Tomorrow", today).as_deref(), Some("2024-02-01"));
        assert_eq!(resolve_due_input("yesterday", today).as_deref(), Some("2024-01-30"));
        assert_eq!(resolve_due_input("+30", today).as_deref(), Some("2024-03-01"));
        assert_eq!(resolve_due_input("2024-1-2", today).as_deref(), Some("2024-01-02"));
        assert_eq!(resolve_due_input("soon", today), None);
    }

    #[test]
    fn month_bounds_handle_december_and_leap_years() {
        assert_eq!(month_bounds(2024, 2), Some((d(2024, 2, 1), d(2024, 2, 29))));
        assert_eq!(month_bounds(2023, 12), Some((d(2023, 12, 1), d(2023, 12, 31))));
        assert_eq!(month_bounds(2023, 13), None);
    }
}
