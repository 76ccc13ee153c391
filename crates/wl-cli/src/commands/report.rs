//! Report command for day, week and month summaries.
//!
//! This module implements `worklog`, `worklog day`, `worklog week` and
//! `worklog month`, with human-readable and JSON output and an optional
//! AI-written summary.

use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use wl_core::{Aggregation, DateRange, Event, Source, parse_date, parse_month, parse_week};

use crate::Config;
use crate::commands::gather;

const DAY_HISTORY_LIMIT: usize = 20;
const RANGE_HISTORY_LIMIT: usize = 30;
const TITLE_LIMIT: usize = 80;

/// Output switches for a report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub json: bool,
    pub summarize: bool,
}

// ========== Range Selection ==========

/// The given date, or `today`.
pub fn day_range(date: Option<&str>, today: NaiveDate) -> Result<DateRange> {
    let date = date.map(parse_date).transpose()?.unwrap_or(today);
    Ok(DateRange::day(date))
}

pub fn yesterday_range(today: NaiveDate) -> DateRange {
    DateRange::day(today.pred_opt().unwrap_or(today))
}

/// The given week, or the week containing `today`.
pub fn week_range(week: Option<&str>, today: NaiveDate) -> Result<DateRange> {
    match week {
        Some(week) => Ok(parse_week(week, today)?),
        None => Ok(DateRange::week_containing(today)),
    }
}

/// The given month, or the month containing `today`.
pub fn month_range(month: Option<&str>, today: NaiveDate) -> Result<DateRange> {
    match month {
        Some(month) => Ok(parse_month(month, today)?),
        None => Ok(DateRange::month(today.year(), today.month())?),
    }
}

/// Header text for a range: a weekday date, an ISO week, a month name, or
/// both ends of a custom range.
pub fn describe_range(range: &DateRange) -> String {
    let start = range.start();
    if range.is_single_day() {
        // "Wednesday, Jan 29, 2025"
        return start.format("%A, %b %-d, %Y").to_string();
    }
    if DateRange::week_containing(start) == *range {
        let week = start.iso_week();
        return format!("Week {}, {}", week.week(), week.year());
    }
    if DateRange::month(start.year(), start.month()).is_ok_and(|month| month == *range) {
        return start.format("%B %Y").to_string();
    }
    format!(
        "{} - {}",
        start.format("%b %-d, %Y"),
        range.end().format("%b %-d, %Y")
    )
}

// ========== Text Output ==========

/// Writes the human-readable report.
pub fn write_report<W: Write>(writer: &mut W, aggregation: &Aggregation) -> io::Result<()> {
    let range = &aggregation.range;
    writeln!(writer, "WORK SUMMARY: {}", describe_range(range))?;
    if !range.is_single_day() {
        writeln!(writer, "{} to {}", range.start(), range.end())?;
    }

    if aggregation.fetched.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No sources returned data.")?;
    } else {
        for &source in &aggregation.fetched {
            writeln!(writer)?;
            write_section(writer, aggregation, source)?;
        }
        writeln!(writer)?;
        write_summary(writer, aggregation)?;
    }

    if !aggregation.warnings.is_empty() {
        writeln!(writer)?;
        heading(writer, "WARNINGS")?;
        for warning in &aggregation.warnings {
            writeln!(writer, "- {warning}")?;
        }
    }

    Ok(())
}

fn heading<W: Write>(writer: &mut W, title: &str) -> io::Result<()> {
    writeln!(writer, "{title}")?;
    writeln!(writer, "{}", "─".repeat(title.chars().count()))
}

fn write_section<W: Write>(writer: &mut W, aggregation: &Aggregation, source: Source) -> io::Result<()> {
    heading(writer, &source.label().to_uppercase())?;

    let events: Vec<&Event> = aggregation.events_from(source).collect();
    if events.is_empty() {
        return writeln!(writer, "  No {} found.", source.label().to_lowercase());
    }

    let with_date = !aggregation.range.is_single_day();
    let shown = if source == Source::History {
        let limit = if with_date {
            RANGE_HISTORY_LIMIT
        } else {
            DAY_HISTORY_LIMIT
        };
        distinct_titles(&events, limit)
    } else {
        events.clone()
    };

    for event in &shown {
        write_event(writer, event, with_date)?;
    }
    let hidden = events.len() - shown.len();
    if hidden > 0 {
        writeln!(writer, "  ... and {hidden} more")?;
    }
    Ok(())
}

/// First `limit` events with distinct titles, ignoring case.
fn distinct_titles<'a>(events: &[&'a Event], limit: usize) -> Vec<&'a Event> {
    let mut seen = HashSet::new();
    events
        .iter()
        .copied()
        .filter(|event| seen.insert(event.title().to_lowercase()))
        .take(limit)
        .collect()
}

fn write_event<W: Write>(writer: &mut W, event: &Event, with_date: bool) -> io::Result<()> {
    let when = if with_date {
        event.timestamp().format("%Y-%m-%d %H:%M").to_string()
    } else {
        event.timestamp().format("%H:%M").to_string()
    };
    writeln!(writer, "  {when}  {}", truncate(event.title(), TITLE_LIMIT))?;
    if !event.detail().is_empty() {
        writeln!(writer, "  {:width$}  {}", "", event.detail(), width = when.len())?;
    }
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

const fn stat_label(source: Source) -> &'static str {
    match source {
        Source::Calendar => "Calendar events:",
        Source::History => "Pages visited:",
        Source::Commit => "Commits:",
        Source::Message => "Slack messages:",
        Source::Issue => "Linear issues:",
    }
}

fn write_summary<W: Write>(writer: &mut W, aggregation: &Aggregation) -> io::Result<()> {
    let summary = &aggregation.summary;
    heading(writer, "SUMMARY")?;
    for &source in &aggregation.fetched {
        writeln!(writer, "{:<18}{}", stat_label(source), summary.count(source))?;
    }
    if summary.count(Source::Commit) > 0 {
        writeln!(writer, "{:<18}+{}", "Lines added:", summary.lines_added)?;
        writeln!(writer, "{:<18}-{}", "Lines deleted:", summary.lines_deleted)?;
    }
    Ok(())
}

fn write_ai_summary<W: Write>(writer: &mut W, summary: &Result<String, String>) -> io::Result<()> {
    writeln!(writer)?;
    heading(writer, "AI SUMMARY")?;
    match summary {
        Ok(text) => writeln!(writer, "{}", text.trim_end()),
        Err(reason) => writeln!(writer, "Summary unavailable: {reason}"),
    }
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: String,
    pub timezone: String,
    #[serde(flatten)]
    pub aggregation: &'a Aggregation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary_error: Option<&'a str>,
}

/// Formats the aggregation as pretty JSON.
pub fn format_report_json(
    aggregation: &Aggregation,
    ai_summary: Option<&Result<String, String>>,
    generated_at: DateTime<Utc>,
    timezone: &str,
) -> Result<String> {
    let report = JsonReport {
        generated_at: generated_at.to_rfc3339(),
        timezone: timezone.to_string(),
        aggregation,
        ai_summary: ai_summary.and_then(|s| s.as_deref().ok()),
        ai_summary_error: ai_summary.and_then(|s| s.as_ref().err().map(String::as_str)),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

// ========== Public Interface ==========

/// Fetches `range` from every configured source and writes the report.
///
/// A failed AI summary is reported in the output; the report itself is
/// still written.
pub async fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    range: DateRange,
    options: ReportOptions,
) -> Result<()> {
    let llm = if options.summarize {
        let key = config
            .anthropic_key()
            .context("--summarize needs anthropic_api_key; run `worklog setup`")?;
        Some(wl_llm::Client::new(key)?)
    } else {
        None
    };

    let aggregation = gather(&config.source_settings(), range).await?;

    let ai_summary = match &llm {
        Some(client) => Some(
            client
                .summarize(&config.model, &aggregation)
                .await
                .map_err(|err| {
                    tracing::warn!(error = %err, "summary request failed");
                    err.to_string()
                }),
        ),
        None => None,
    };

    if options.json {
        let timezone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
        let output = format_report_json(&aggregation, ai_summary.as_ref(), Utc::now(), &timezone)?;
        writeln!(writer, "{output}")?;
    } else {
        write_report(writer, &aggregation)?;
        if let Some(summary) = &ai_summary {
            write_ai_summary(writer, summary)?;
        }
    }

    Ok(())
}
