//! Concurrent fetch, normalize and aggregate.

use std::collections::BTreeSet;

use chrono::TimeZone;
use tokio::task::JoinSet;
use wl_core::{Aggregation, DateRange, Normalizer, Source, SourceOutcome, aggregate};

use crate::client::SourceClient;

/// Fetches every client concurrently, one task each, and merges the results.
///
/// A client that errors or whose task panics becomes a `SourceUnavailable`
/// warning; the other sources are unaffected.
pub async fn collect<C, Tz>(clients: Vec<C>, range: DateRange, normalizer: &Normalizer<Tz>) -> Aggregation
where
    C: SourceClient + 'static,
    Tz: TimeZone + Sync,
{
    let mut pending: BTreeSet<Source> = clients.iter().map(SourceClient::source).collect();
    let mut tasks = JoinSet::new();
    for client in clients {
        tasks.spawn(async move {
            let source = client.source();
            let result = client.fetch(&range).await;
            (source, result)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((source, Ok(records))) => {
                pending.remove(&source);
                let (events, rejected) = normalizer.normalize_all(&records);
                tracing::debug!(
                    %source,
                    records = records.len(),
                    rejected = rejected.len(),
                    "fetched source"
                );
                outcomes.push(SourceOutcome::Fetched {
                    source,
                    events,
                    rejected,
                });
            }
            Ok((source, Err(err))) => {
                pending.remove(&source);
                outcomes.push(SourceOutcome::Unavailable {
                    source,
                    reason: err.to_string(),
                });
            }
            Err(err) => tracing::error!(error = %err, "source task failed"),
        }
    }

    // Tasks that died never reported their source
    outcomes.extend(pending.into_iter().map(|source| SourceOutcome::Unavailable {
        source,
        reason: "fetch task panicked".to_string(),
    }));

    aggregate(range, outcomes)
}
