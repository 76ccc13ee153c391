use std::path::PathBuf;

use thiserror::Error;

/// A failure that makes one source unavailable for the current run.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The API answered with a non-success status or an error payload.
    #[error("API error: {message}")]
    Api { message: String },
    /// Credentials were rejected or could not be refreshed.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A local file the source depends on does not exist.
    #[error("{what} not found at {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The blocking task reading the source died.
    #[error("background task failed: {0}")]
    Task(String),
}

impl SourceError {
    pub(crate) fn invalid(err: impl std::fmt::Display) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Problems with the configured sources that stop a run before any fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no activity sources are configured; run `worklog setup`")]
    NoSources,
    #[error("{present} is set but {missing} is not; run `worklog setup`")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
    #[error("failed to initialize {kind} client: {reason}")]
    ClientInit { kind: wl_core::Source, reason: String },
}
