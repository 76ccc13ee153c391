//! Source-specific records as returned by the clients, before normalization.
//!
//! Fields that a source may omit are `Option`s; the normalizer decides which
//! of them are required. Timestamps stay in each source's native format.

use crate::source::Source;

/// A calendar entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarRecord {
    pub summary: Option<String>,
    /// RFC 3339 with offset for timed events, `YYYY-MM-DD` for all-day events.
    pub start: Option<String>,
    pub end: Option<String>,
    pub location: Option<String>,
}

/// A browser history visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRecord {
    pub url: String,
    pub title: Option<String>,
    /// Unix epoch seconds.
    pub visited_at: Option<i64>,
}

/// A commit authored by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRecord {
    pub repo: String,
    pub sha: String,
    pub message: Option<String>,
    /// ISO 8601, normally UTC (`2025-01-29T17:04:11Z`).
    pub authored_at: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
}

/// A chat message sent by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRecord {
    pub channel: String,
    pub text: Option<String>,
    /// Slack `ts` (`"1738170000.000200"`) or ISO 8601.
    pub ts: Option<String>,
}

/// An issue the user touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueRecord {
    pub identifier: String,
    pub title: Option<String>,
    pub state: Option<String>,
    pub team: Option<String>,
    /// ISO 8601 UTC.
    pub updated_at: Option<String>,
}

/// One raw record, tagged with the source it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    Calendar(CalendarRecord),
    History(HistoryRecord),
    Commit(CommitRecord),
    Message(MessageRecord),
    Issue(IssueRecord),
}

impl RawRecord {
    pub const fn source(&self) -> Source {
        match self {
            Self::Calendar(_) => Source::Calendar,
            Self::History(_) => Source::History,
            Self::Commit(_) => Source::Commit,
            Self::Message(_) => Source::Message,
            Self::Issue(_) => Source::Issue,
        }
    }
}

impl From<CalendarRecord> for RawRecord {
    fn from(record: CalendarRecord) -> Self {
        Self::Calendar(record)
    }
}

impl From<HistoryRecord> for RawRecord {
    fn from(record: HistoryRecord) -> Self {
        Self::History(record)
    }
}

impl From<CommitRecord> for RawRecord {
    fn from(record: CommitRecord) -> Self {
        Self::Commit(record)
    }
}

impl From<MessageRecord> for RawRecord {
    fn from(record: MessageRecord) -> Self {
        Self::Message(record)
    }
}

impl From<IssueRecord> for RawRecord {
    fn from(record: IssueRecord) -> Self {
        Self::Issue(record)
    }
}
