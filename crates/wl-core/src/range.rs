//! Inclusive date windows and the parsers that produce them.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc,
    Weekday,
};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Date formats accepted on the command line, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

static WEEK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\d{4})-[Ww])?(\d{1,2})$").unwrap());

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Errors from building or parsing a [`DateRange`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("range start {start} is after range end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },

    #[error("could not parse date: {0}")]
    InvalidDate(String),

    #[error("invalid week '{0}': use YYYY-Wnn or a week number")]
    InvalidWeek(String),

    #[error("invalid month '{0}': use YYYY-MM, a month name, or a month number")]
    InvalidMonth(String),
}

/// An inclusive `[start, end]` window of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// A single calendar day.
    pub const fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Monday through Sunday of the week containing `date`.
    pub fn week_containing(date: NaiveDate) -> Self {
        let week = date.week(Weekday::Mon);
        Self {
            start: week.first_day(),
            end: week.last_day(),
        }
    }

    /// Monday through Sunday of ISO week `week` in ISO year `year`.
    pub fn iso_week(year: i32, week: u32) -> Result<Self, RangeError> {
        let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .ok_or_else(|| RangeError::InvalidWeek(format!("{year}-W{week:02}")))?;
        Ok(Self::week_containing(monday))
    }

    /// First through last day of a calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, RangeError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| RangeError::InvalidMonth(format!("{year}-{month:02}")))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| RangeError::InvalidMonth(format!("{year}-{month:02}")))?;
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// Number of days covered, counting both ends.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Resolves the range to a half-open UTC window: midnight of `start` up to
    /// (but excluding) midnight after `end`, both in `tz`.
    pub fn bounds<Tz: TimeZone>(&self, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let after_end = self.end.succ_opt().unwrap_or(self.end);
        (midnight_in(tz, self.start), midnight_in(tz, after_end))
    }
}

/// Midnight of `date` in `tz`, as UTC.
///
/// Ambiguous midnights (DST fall-back) resolve to the earlier instant. A
/// midnight that does not exist (DST spring-forward) moves to 01:00.
fn midnight_in<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc)),
    }
}

/// Parses a date in one of the accepted formats.
pub fn parse_date(s: &str) -> Result<NaiveDate, RangeError> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| RangeError::InvalidDate(s.to_string()))
}

/// Parses `YYYY-Wnn` or a bare week number (in `today`'s year).
pub fn parse_week(s: &str, today: NaiveDate) -> Result<DateRange, RangeError> {
    let trimmed = s.trim();
    let caps = WEEK_RE
        .captures(trimmed)
        .ok_or_else(|| RangeError::InvalidWeek(s.to_string()))?;
    let year = match caps.get(1) {
        Some(y) => y
            .as_str()
            .parse()
            .map_err(|_| RangeError::InvalidWeek(s.to_string()))?,
        None => today.year(),
    };
    let week: u32 = caps[2]
        .parse()
        .map_err(|_| RangeError::InvalidWeek(s.to_string()))?;
    DateRange::iso_week(year, week).map_err(|_| RangeError::InvalidWeek(s.to_string()))
}

/// Parses `YYYY-MM`, a month name (full or three-letter), or a month number.
///
/// Names and numbers resolve in `today`'s year.
pub fn parse_month(s: &str, today: NaiveDate) -> Result<DateRange, RangeError> {
    let trimmed = s.trim().to_lowercase();
    let invalid = || RangeError::InvalidMonth(s.to_string());

    let (year, month) = if let Some((y, m)) = trimmed.split_once('-') {
        (
            y.parse().map_err(|_| invalid())?,
            m.parse().map_err(|_| invalid())?,
        )
    } else if let Ok(m) = trimmed.parse::<u32>() {
        (today.year(), m)
    } else {
        let position = MONTH_NAMES
            .iter()
            .position(|name| *name == trimmed || (trimmed.len() == 3 && name.starts_with(&trimmed)))
            .ok_or_else(invalid)?;
        let month = u32::try_from(position).map_err(|_| invalid())? + 1;
        (today.year(), month)
    };

    DateRange::month(year, month).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_rejects_inverted_range() {
        let err = DateRange::new(date(2025, 2, 1), date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, RangeError::Inverted { .. }));
        assert!(DateRange::new(date(2025, 1, 1), date(2025, 1, 1)).is_ok());
    }

    #[test]
    fn week_containing_wednesday() {
        // Jan 29, 2025 is a Wednesday
        let range = DateRange::week_containing(date(2025, 1, 29));
        assert_eq!(range.start(), date(2025, 1, 27));
        assert_eq!(range.end(), date(2025, 2, 2));
        assert_eq!(range.len_days(), 7);
    }

    #[test]
    fn week_containing_sunday_stays_in_same_week() {
        let range = DateRange::week_containing(date(2025, 2, 2));
        assert_eq!(range.start(), date(2025, 1, 27));
    }

    #[test]
    fn month_handles_leap_february() {
        let range = DateRange::month(2024, 2).unwrap();
        assert_eq!(range.start(), date(2024, 2, 1));
        assert_eq!(range.end(), date(2024, 2, 29));
    }

    #[test]
    fn month_handles_december() {
        let range = DateRange::month(2024, 12).unwrap();
        assert_eq!(range.end(), date(2024, 12, 31));
        assert!(DateRange::month(2024, 13).is_err());
    }

    #[test]
    fn bounds_are_half_open_local_midnights() {
        let tz = FixedOffset::west_opt(8 * 3600).unwrap();
        let (start, end) = DateRange::day(date(2025, 1, 29)).bounds(&tz);
        assert_eq!(start.to_rfc3339(), "2025-01-29T08:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-01-30T08:00:00+00:00");
    }

    #[test]
    fn contains_is_inclusive() {
        let range = DateRange::new(date(2025, 1, 27), date(2025, 1, 29)).unwrap();
        assert!(range.contains(date(2025, 1, 27)));
        assert!(range.contains(date(2025, 1, 29)));
        assert!(!range.contains(date(2025, 1, 30)));
    }

    #[test]
    fn parse_date_accepts_all_formats() {
        assert_eq!(parse_date("2025-01-29").unwrap(), date(2025, 1, 29));
        assert_eq!(parse_date("29/01/2025").unwrap(), date(2025, 1, 29));
        // Day-first wins when ambiguous; 13 can only be a day here
        assert_eq!(parse_date("01/13/2025").unwrap(), date(2025, 1, 13));
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn parse_week_with_year() {
        let range = parse_week("2025-W05", date(2024, 6, 1)).unwrap();
        assert_eq!(range.start(), date(2025, 1, 27));
    }

    #[test]
    fn parse_week_bare_number_uses_current_year() {
        let range = parse_week("5", date(2025, 6, 1)).unwrap();
        assert_eq!(range.start(), date(2025, 1, 27));
        assert!(parse_week("54", date(2025, 6, 1)).is_err());
        assert!(parse_week("W5", date(2025, 6, 1)).is_err());
    }

    #[test]
    fn parse_month_variants() {
        let today = date(2025, 6, 1);
        assert_eq!(parse_month("2024-01", today).unwrap().start(), date(2024, 1, 1));
        assert_eq!(parse_month("January", today).unwrap().start(), date(2025, 1, 1));
        assert_eq!(parse_month("sep", today).unwrap().start(), date(2025, 9, 1));
        assert_eq!(parse_month("3", today).unwrap().start(), date(2025, 3, 1));
        assert!(parse_month("smarch", today).is_err());
        assert!(parse_month("2024-13", today).is_err());
    }
}
