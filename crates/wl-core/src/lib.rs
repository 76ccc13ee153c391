//! Core domain logic for worklog.
//!
//! This crate contains the source-independent parts of the pipeline:
//! - Event model: the normalized unit of activity every source maps into
//! - Normalization: turning raw source records into events in one timezone
//! - Aggregation: merging per-source results into a sorted, summarized view
//! - Date ranges: day/week/month windows and their command-line parsers

mod aggregate;
pub mod event;
pub mod normalize;
pub mod range;
pub mod raw;
pub mod source;

pub use aggregate::{Aggregation, SourceOutcome, Summary, Warning, aggregate};
pub use event::{Event, Metrics};
pub use normalize::{NormalizationError, Normalizer};
pub use range::{DateRange, RangeError, parse_date, parse_month, parse_week};
pub use raw::{CalendarRecord, CommitRecord, HistoryRecord, IssueRecord, MessageRecord, RawRecord};
pub use source::{Source, UnknownSource};
