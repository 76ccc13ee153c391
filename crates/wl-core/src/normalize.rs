//! Conversion of raw source records into [`Event`]s.
//!
//! Each source reports time differently: Google Calendar uses RFC 3339 with
//! the event's own offset (or a bare date for all-day events), the browser
//! history reader hands over epoch seconds, GitHub and Linear use ISO 8601
//! UTC, and Slack uses its `seconds.micros` `ts` strings. Everything is
//! converted into a single canonical timezone so the aggregator can compare
//! dates directly.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rayon::prelude::*;
use thiserror::Error;

use crate::event::{Event, Metrics};
use crate::raw::{CalendarRecord, CommitRecord, HistoryRecord, IssueRecord, MessageRecord, RawRecord};
use crate::source::Source;

/// Why a raw record could not become an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("{kind} record is missing {field}")]
    MissingField { kind: Source, field: &'static str },

    #[error("{kind} record has unparsable timestamp {value:?}")]
    InvalidTimestamp { kind: Source, value: String },
}

impl NormalizationError {
    pub const fn kind(&self) -> Source {
        match self {
            Self::MissingField { kind, .. } | Self::InvalidTimestamp { kind, .. } => *kind,
        }
    }
}

/// Normalizes raw records into events in the timezone `tz`.
#[derive(Debug, Clone)]
pub struct Normalizer<Tz: TimeZone> {
    tz: Tz,
}

impl<Tz: TimeZone + Sync> Normalizer<Tz> {
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Produces exactly one event for `record`, or the reason it was rejected.
    pub fn normalize(&self, record: &RawRecord) -> Result<Event, NormalizationError> {
        match record {
            RawRecord::Calendar(r) => self.calendar(r),
            RawRecord::History(r) => self.history(r),
            RawRecord::Commit(r) => self.commit(r),
            RawRecord::Message(r) => self.message(r),
            RawRecord::Issue(r) => self.issue(r),
        }
    }

    /// Normalizes a batch in parallel, preserving input order in both outputs.
    pub fn normalize_all(&self, records: &[RawRecord]) -> (Vec<Event>, Vec<NormalizationError>) {
        let results: Vec<_> = records.par_iter().map(|r| self.normalize(r)).collect();

        let mut events = Vec::with_capacity(results.len());
        let mut rejected = Vec::new();
        for result in results {
            match result {
                Ok(event) => events.push(event),
                Err(err) => rejected.push(err),
            }
        }
        (events, rejected)
    }

    fn canonical<T: TimeZone>(&self, dt: &DateTime<T>) -> DateTime<FixedOffset> {
        dt.with_timezone(&self.tz).fixed_offset()
    }

    fn calendar(&self, r: &CalendarRecord) -> Result<Event, NormalizationError> {
        const KIND: Source = Source::Calendar;
        let title = required_text(r.summary.as_deref(), KIND, "summary")?;
        let start = r.start.as_deref().ok_or(NormalizationError::MissingField {
            kind: KIND,
            field: "start",
        })?;

        let (timestamp, mut detail) = if start.contains('T') {
            let begin = DateTime::parse_from_rfc3339(start)
                .map_err(|_| invalid_timestamp(KIND, start))?;
            let begin = self.canonical(&begin);
            let end = r
                .end
                .as_deref()
                .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
                .map(|e| self.canonical(&e));
            let detail = match end {
                Some(end) if end > begin => format!(
                    "{} - {} ({})",
                    begin.format("%H:%M"),
                    end.format("%H:%M"),
                    format_span(end - begin)
                ),
                _ => begin.format("%H:%M").to_string(),
            };
            (begin, detail)
        } else {
            let day = NaiveDate::parse_from_str(start, "%Y-%m-%d")
                .map_err(|_| invalid_timestamp(KIND, start))?;
            let midnight = self
                .tz
                .from_local_datetime(&day.and_time(NaiveTime::MIN))
                .earliest()
                .ok_or_else(|| invalid_timestamp(KIND, start))?;
            (midnight.fixed_offset(), "All day".to_string())
        };

        if let Some(location) = r.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            detail.push_str(" @ ");
            detail.push_str(location);
        }

        Ok(Event::new(timestamp, KIND, title, detail, None))
    }

    fn history(&self, r: &HistoryRecord) -> Result<Event, NormalizationError> {
        const KIND: Source = Source::History;
        let title = required_text(r.title.as_deref(), KIND, "title")?;
        let secs = r.visited_at.ok_or(NormalizationError::MissingField {
            kind: KIND,
            field: "visited_at",
        })?;
        let visited = (secs > 0)
            .then(|| Utc.timestamp_opt(secs, 0).single())
            .flatten()
            .ok_or_else(|| invalid_timestamp(KIND, &secs.to_string()))?;

        Ok(Event::new(self.canonical(&visited), KIND, title, r.url.clone(), None))
    }

    fn commit(&self, r: &CommitRecord) -> Result<Event, NormalizationError> {
        const KIND: Source = Source::Commit;
        let first_line = r.message.as_deref().and_then(|m| m.lines().next());
        let title = required_text(first_line, KIND, "message")?;
        let authored = r.authored_at.as_deref().ok_or(NormalizationError::MissingField {
            kind: KIND,
            field: "authored_at",
        })?;
        let authored = parse_iso_utc(authored).ok_or_else(|| invalid_timestamp(KIND, authored))?;

        let metrics = (r.additions.is_some() || r.deletions.is_some()).then(|| Metrics {
            lines_added: r.additions.unwrap_or(0),
            lines_deleted: r.deletions.unwrap_or(0),
        });

        let short_sha: String = r.sha.chars().take(7).collect();
        let mut detail = format!("{}@{short_sha}", r.repo);
        if let Some(m) = metrics {
            detail.push_str(&format!(" +{}/-{}", m.lines_added, m.lines_deleted));
        }

        Ok(Event::new(self.canonical(&authored), KIND, title, detail, metrics))
    }

    fn message(&self, r: &MessageRecord) -> Result<Event, NormalizationError> {
        const KIND: Source = Source::Message;
        let collapsed = r
            .text
            .as_deref()
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "));
        let title = required_text(collapsed.as_deref(), KIND, "text")?;
        let ts = r.ts.as_deref().ok_or(NormalizationError::MissingField {
            kind: KIND,
            field: "ts",
        })?;
        let sent = parse_slack_ts(ts).ok_or_else(|| invalid_timestamp(KIND, ts))?;

        Ok(Event::new(self.canonical(&sent), KIND, title, r.channel.clone(), None))
    }

    fn issue(&self, r: &IssueRecord) -> Result<Event, NormalizationError> {
        const KIND: Source = Source::Issue;
        let name = required_text(r.title.as_deref(), KIND, "title")?;
        let updated = r.updated_at.as_deref().ok_or(NormalizationError::MissingField {
            kind: KIND,
            field: "updated_at",
        })?;
        let updated = parse_iso_utc(updated).ok_or_else(|| invalid_timestamp(KIND, updated))?;

        let title = if r.identifier.is_empty() {
            name
        } else {
            format!("{} {name}", r.identifier)
        };
        let detail = [r.state.as_deref(), r.team.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" · ");

        Ok(Event::new(self.canonical(&updated), KIND, title, detail, None))
    }
}

fn required_text(
    value: Option<&str>,
    kind: Source,
    field: &'static str,
) -> Result<String, NormalizationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(NormalizationError::MissingField { kind, field })
}

fn invalid_timestamp(kind: Source, value: &str) -> NormalizationError {
    NormalizationError::InvalidTimestamp {
        kind,
        value: value.to_string(),
    }
}

/// Parses ISO 8601 with an offset, or without one as UTC.
fn parse_iso_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .ok()
}

/// Parses a Slack `ts` (`"1738170000.000200"`), falling back to ISO 8601.
fn parse_slack_ts(value: &str) -> Option<DateTime<Utc>> {
    if value.contains('T') {
        return parse_iso_utc(value);
    }
    let (secs, frac) = value.split_once('.').unwrap_or((value, ""));
    let secs: i64 = secs.parse().ok().filter(|s| *s > 0)?;
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // Right-pad to nanoseconds; Slack sends six fractional digits.
    let nanos: u32 = format!("{frac:0<9}").get(..9)?.parse().ok()?;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Formats a span as "Xh Ym" when at least an hour, otherwise "Ym".
fn format_span(span: chrono::Duration) -> String {
    let total_minutes = span.num_minutes().max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
