//! Normalized activity events.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::source::Source;

/// Line counts attached to a code change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// A unit of user activity in the canonical timezone.
///
/// Events are immutable once built; the normalizer is the only producer in
/// this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    timestamp: DateTime<FixedOffset>,
    source: Source,
    title: String,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<Metrics>,
}

impl Event {
    pub fn new(
        timestamp: DateTime<FixedOffset>,
        source: Source,
        title: impl Into<String>,
        detail: impl Into<String>,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            timestamp,
            source,
            title: title.into(),
            detail: detail.into(),
            metrics,
        }
    }

    pub const fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub const fn source(&self) -> Source {
        self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub const fn metrics(&self) -> Option<Metrics> {
        self.metrics
    }

    /// Calendar date of the event in its own (canonical) offset.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Total order used for merging: timestamp, then source, then title.
    pub fn merge_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.source.cmp(&other.source))
            .then_with(|| self.title.cmp(&other.title))
    }
}
