use std::future::Future;
use std::time::Duration;

use wl_core::{DateRange, RawRecord, Source};

use crate::error::SourceError;

/// Default request timeout for API calls.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("worklog/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 200;

/// Adapter that fetches raw activity records from one external system.
///
/// Any error means the source is unavailable for this run. Clients own their
/// HTTP client and credentials and share no mutable state.
pub trait SourceClient: Send + Sync {
    fn source(&self) -> Source;

    fn fetch(
        &self,
        range: &DateRange,
    ) -> impl Future<Output = Result<Vec<RawRecord>, SourceError>> + Send;
}

pub(crate) fn http_client() -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(SourceError::ClientBuild)
}

/// Reads a response body, turning non-success statuses into errors.
///
/// `extract` pulls a human-readable message out of the API's error payload.
pub(crate) async fn read_body(
    response: reqwest::Response,
    extract: fn(&str) -> Option<String>,
) -> Result<String, SourceError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    let message = extract(&body).unwrap_or_else(|| truncate(&body, MAX_ERROR_BODY));
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(SourceError::Auth(message));
    }
    Err(SourceError::Api {
        message: format!("status {status}: {message}"),
    })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
