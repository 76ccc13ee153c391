//! CLI subcommand implementations.

use chrono::Local;
use wl_core::{Aggregation, DateRange, Normalizer};
use wl_sources::{ConfigurationError, ConfiguredSource, SourceSettings, collect};

pub mod chat;
pub mod report;
pub mod setup;
pub mod status;

/// Fetches every configured source for `range` and merges the results in the
/// local timezone.
pub async fn gather(settings: &SourceSettings, range: DateRange) -> Result<Aggregation, ConfigurationError> {
    let clients = settings.build_clients()?;
    Ok(gather_from(clients, range).await)
}

pub(crate) async fn gather_from(clients: Vec<ConfiguredSource>, range: DateRange) -> Aggregation {
    tracing::debug!(sources = clients.len(), start = %range.start(), end = %range.end(), "collecting");
    collect(clients, range, &Normalizer::new(Local)).await
}
