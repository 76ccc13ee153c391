//! A size-bounded view of an aggregation for use in prompts and tool results.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use wl_core::{Aggregation, Event, Source};

const MESSAGE_TEXT_LIMIT: usize = 200;

/// Most items sent to the model per source.
const fn item_limit(source: Source) -> usize {
    match source {
        Source::History | Source::Message => 50,
        Source::Issue => 30,
        Source::Calendar | Source::Commit => 100,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkDigest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Every source that was fetched, even when it returned nothing.
    pub sources: BTreeMap<Source, SourceDigest>,
    pub lines_added: u64,
    pub lines_deleted: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceDigest {
    /// Events before deduplication and truncation.
    pub total: usize,
    pub items: Vec<DigestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestItem {
    pub time: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl WorkDigest {
    pub fn from_aggregation(aggregation: &Aggregation) -> Self {
        let mut sources: BTreeMap<Source, SourceDigest> = aggregation
            .fetched
            .iter()
            .map(|source| (*source, SourceDigest::default()))
            .collect();
        let mut seen_titles = HashSet::new();

        for event in &aggregation.events {
            let digest = sources.entry(event.source()).or_default();
            digest.total += 1;
            if digest.items.len() >= item_limit(event.source()) {
                continue;
            }
            if event.source() == Source::History && !seen_titles.insert(event.title().to_lowercase()) {
                continue;
            }
            digest.items.push(DigestItem::from_event(event));
        }

        Self {
            start: aggregation.range.start(),
            end: aggregation.range.end(),
            sources,
            lines_added: aggregation.summary.lines_added,
            lines_deleted: aggregation.summary.lines_deleted,
            warnings: aggregation.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

impl DigestItem {
    fn from_event(event: &Event) -> Self {
        let title = if event.source() == Source::Message {
            truncate_chars(event.title(), MESSAGE_TEXT_LIMIT)
        } else {
            event.title().to_string()
        };
        Self {
            time: event.timestamp().format("%Y-%m-%d %H:%M").to_string(),
            title,
            detail: event.detail().to_string(),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
