//! Source kind enum as the single source of truth for source names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The system an event was fetched from.
///
/// Declaration order doubles as the tie-break order when two events share a
/// timestamp, so do not reorder variants casually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Calendar,
    History,
    Commit,
    Message,
    Issue,
}

impl Source {
    /// All sources in tie-break order.
    pub const ALL: [Self; 5] = [
        Self::Calendar,
        Self::History,
        Self::Commit,
        Self::Message,
        Self::Issue,
    ];

    /// Stable lower-case name used in JSON output and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::History => "history",
            Self::Commit => "commit",
            Self::Message => "message",
            Self::Issue => "issue",
        }
    }

    /// Heading used by the human-readable report.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Calendar => "Calendar Events",
            Self::History => "Search History",
            Self::Commit => "GitHub Commits",
            Self::Message => "Slack Messages",
            Self::Issue => "Linear Issues",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(Self::Calendar),
            "history" | "browser" | "chrome" => Ok(Self::History),
            "commit" | "github" => Ok(Self::Commit),
            "message" | "slack" => Ok(Self::Message),
            "issue" | "linear" => Ok(Self::Issue),
            _ => Err(UnknownSource(s.to_string())),
        }
    }
}

impl Serialize for Source {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown source strings.
#[derive(Debug, Clone)]
pub struct UnknownSource(String);

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown source: {}", self.0)
    }
}

impl std::error::Error for UnknownSource {}
