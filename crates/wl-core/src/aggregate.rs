//! Merging per-source results into one chronological view.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::event::Event;
use crate::normalize::NormalizationError;
use crate::range::DateRange;
use crate::source::Source;

/// What one source produced for a range.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    /// The fetch succeeded. `rejected` holds records that failed to normalize.
    Fetched {
        source: Source,
        events: Vec<Event>,
        rejected: Vec<NormalizationError>,
    },
    /// The source could not be fetched at all.
    Unavailable { source: Source, reason: String },
}

impl SourceOutcome {
    pub const fn source(&self) -> Source {
        match self {
            Self::Fetched { source, .. } | Self::Unavailable { source, .. } => *source,
        }
    }
}

/// A non-fatal problem encountered while building an [`Aggregation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    SourceUnavailable { source: Source, reason: String },
    RecordSkipped { source: Source, reason: String },
}

impl Warning {
    pub const fn source(&self) -> Source {
        match self {
            Self::SourceUnavailable { source, .. } | Self::RecordSkipped { source, .. } => *source,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable { source, reason } => {
                write!(f, "{} unavailable: {reason}", source.label())
            }
            Self::RecordSkipped { source, reason } => {
                write!(f, "skipped {source} record: {reason}")
            }
        }
    }
}

/// Per-source counts and commit totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Only sources with at least one event appear here.
    pub counts_by_source: BTreeMap<Source, usize>,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

impl Summary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = Self::default();
        for event in events {
            *summary.counts_by_source.entry(event.source()).or_insert(0) += 1;
            if let Some(m) = event.metrics() {
                summary.lines_added += m.lines_added;
                summary.lines_deleted += m.lines_deleted;
            }
        }
        summary
    }

    pub fn count(&self, source: Source) -> usize {
        self.counts_by_source.get(&source).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts_by_source.values().sum()
    }
}

/// The merged result for one date range.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub range: DateRange,
    /// Sorted by timestamp, then source, then title.
    pub events: Vec<Event>,
    pub summary: Summary,
    pub warnings: Vec<Warning>,
    /// Sources whose fetch succeeded, even if they returned nothing.
    pub fetched: Vec<Source>,
}

impl Aggregation {
    pub fn events_from(&self, source: Source) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.source() == source)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Merges per-source outcomes into an [`Aggregation`] for `range`.
///
/// Events dated outside the range are dropped. The result does not depend on
/// the order the outcomes arrive in.
pub fn aggregate(range: DateRange, outcomes: impl IntoIterator<Item = SourceOutcome>) -> Aggregation {
    let mut events = Vec::new();
    let mut warnings = Vec::new();
    let mut fetched = BTreeSet::new();

    for outcome in outcomes {
        match outcome {
            SourceOutcome::Fetched {
                source,
                events: source_events,
                rejected,
            } => {
                fetched.insert(source);
                let total = source_events.len();
                let kept_before = events.len();
                events.extend(source_events.into_iter().filter(|e| range.contains(e.date())));
                let dropped = total - (events.len() - kept_before);
                if dropped > 0 {
                    tracing::debug!(%source, dropped, "dropped events outside range");
                }
                warnings.extend(rejected.into_iter().map(|err| Warning::RecordSkipped {
                    source,
                    reason: err.to_string(),
                }));
            }
            SourceOutcome::Unavailable { source, reason } => {
                tracing::warn!(%source, %reason, "source unavailable");
                warnings.push(Warning::SourceUnavailable { source, reason });
            }
        }
    }

    events.sort_by(Event::merge_cmp);
    warnings.sort_by_key(Warning::source);
    let summary = Summary::from_events(&events);

    Aggregation {
        range,
        events,
        summary,
        warnings,
        fetched: fetched.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Metrics;
    use crate::normalize::Normalizer;
    use crate::raw::{HistoryRecord, RawRecord};
    use chrono::{DateTime, FixedOffset, NaiveDate};

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    fn day() -> DateRange {
        DateRange::day(NaiveDate::from_ymd_opt(2025, 1, 29).unwrap())
    }

    fn commit(ts: &str, title: &str, added: u64, deleted: u64) -> Event {
        Event::new(
            at(ts),
            Source::Commit,
            title,
            "acme/api@abc1234",
            Some(Metrics {
                lines_added: added,
                lines_deleted: deleted,
            }),
        )
    }

    fn meeting(ts: &str, title: &str) -> Event {
        Event::new(at(ts), Source::Calendar, title, "", None)
    }

    fn fetched(source: Source, events: Vec<Event>) -> SourceOutcome {
        SourceOutcome::Fetched {
            source,
            events,
            rejected: Vec::new(),
        }
    }

    #[test]
    fn interleaves_sources_chronologically() {
        let outcomes = vec![
            fetched(
                Source::Calendar,
                vec![
                    meeting("2025-01-29T14:00:00+00:00", "Planning"),
                    meeting("2025-01-29T09:00:00+00:00", "Standup"),
                ],
            ),
            fetched(
                Source::Commit,
                vec![commit("2025-01-29T11:00:00+00:00", "Fix bug", 10, 2)],
            ),
        ];
        let agg = aggregate(day(), outcomes);
        let titles: Vec<_> = agg.events.iter().map(Event::title).collect();
        assert_eq!(titles, vec!["Standup", "Fix bug", "Planning"]);
        assert_eq!(agg.summary.count(Source::Calendar), 2);
        assert_eq!(agg.summary.count(Source::Commit), 1);
        assert_eq!(agg.summary.lines_added, 10);
        assert_eq!(agg.summary.lines_deleted, 2);
        assert!(agg.warnings.is_empty());
    }

    #[test]
    fn unavailable_source_yields_one_warning_and_no_count() {
        let outcomes = vec![
            fetched(Source::Calendar, vec![meeting("2025-01-29T09:00:00+00:00", "Standup")]),
            SourceOutcome::Unavailable {
                source: Source::Message,
                reason: "invalid_auth".into(),
            },
        ];
        let agg = aggregate(day(), outcomes);
        assert_eq!(agg.events.len(), 1);
        assert_eq!(
            agg.warnings,
            vec![Warning::SourceUnavailable {
                source: Source::Message,
                reason: "invalid_auth".into()
            }]
        );
        assert!(!agg.summary.counts_by_source.contains_key(&Source::Message));
        assert_eq!(agg.fetched, vec![Source::Calendar]);
    }

    #[test]
    fn empty_source_is_fetched_without_warning() {
        let agg = aggregate(day(), vec![fetched(Source::Issue, Vec::new())]);
        assert!(agg.is_empty());
        assert!(agg.warnings.is_empty());
        assert_eq!(agg.fetched, vec![Source::Issue]);
        assert_eq!(agg.summary.total(), 0);
    }

    #[test]
    fn drops_events_outside_range() {
        let outcomes = vec![fetched(
            Source::Calendar,
            vec![
                meeting("2025-01-28T23:59:00+00:00", "Late"),
                meeting("2025-01-29T00:00:00+00:00", "Midnight"),
                meeting("2025-01-30T00:00:00+00:00", "Tomorrow"),
            ],
        )];
        let agg = aggregate(day(), outcomes);
        let titles: Vec<_> = agg.events.iter().map(Event::title).collect();
        assert_eq!(titles, vec!["Midnight"]);
    }

    #[test]
    fn unparsable_record_becomes_skip_warning() {
        let normalizer = Normalizer::new(FixedOffset::east_opt(0).unwrap());
        let records = vec![
            RawRecord::History(HistoryRecord {
                url: "https://example.com/a".into(),
                title: Some("A".into()),
                visited_at: Some(1_738_141_200),
            }),
            RawRecord::History(HistoryRecord {
                url: "https://example.com/b".into(),
                title: Some("B".into()),
                visited_at: None,
            }),
        ];
        let (events, rejected) = normalizer.normalize_all(&records);
        let agg = aggregate(
            day(),
            vec![SourceOutcome::Fetched {
                source: Source::History,
                events,
                rejected,
            }],
        );
        assert_eq!(agg.events.len(), 1);
        assert_eq!(agg.warnings.len(), 1);
        assert!(matches!(
            &agg.warnings[0],
            Warning::RecordSkipped {
                source: Source::History,
                ..
            }
        ));
    }

    #[test]
    fn result_is_independent_of_outcome_order() {
        let make = || {
            vec![
                fetched(Source::Commit, vec![commit("2025-01-29T09:00:00+00:00", "b", 1, 1)]),
                fetched(Source::Calendar, vec![meeting("2025-01-29T09:00:00+00:00", "a")]),
                SourceOutcome::Unavailable {
                    source: Source::Issue,
                    reason: "timeout".into(),
                },
                SourceOutcome::Unavailable {
                    source: Source::Message,
                    reason: "timeout".into(),
                },
            ]
        };
        let forward = aggregate(day(), make());
        let mut reversed_input = make();
        reversed_input.reverse();
        let reversed = aggregate(day(), reversed_input);

        assert_eq!(forward.events, reversed.events);
        assert_eq!(forward.warnings, reversed.warnings);
        assert_eq!(forward.fetched, reversed.fetched);
        // Same timestamp: calendar sorts before commit
        assert_eq!(forward.events[0].source(), Source::Calendar);
    }

    #[test]
    fn warning_display() {
        let warning = Warning::SourceUnavailable {
            source: Source::Message,
            reason: "token revoked".into(),
        };
        assert_eq!(warning.to_string(), "Slack Messages unavailable: token revoked");
    }

    #[test]
    fn serializes_counts_keyed_by_source_name() {
        let agg = aggregate(
            day(),
            vec![fetched(
                Source::Commit,
                vec![commit("2025-01-29T09:00:00+00:00", "x", 3, 4)],
            )],
        );
        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json["summary"]["counts_by_source"]["commit"], 1);
        assert_eq!(json["range"]["start"], "2025-01-29");
    }
}
