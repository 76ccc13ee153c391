//! Commits authored by the user, across every repository GitHub can see.
//!
//! The commit search API is the primary path; each hit gets a detail call
//! for line stats. Search does not index every repository, so an empty
//! result falls back to the user's public `PushEvent` feed.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use wl_core::{CommitRecord, DateRange, RawRecord, Source};

use crate::client::{SourceClient, http_client, read_body};
use crate::error::SourceError;

const GITHUB_API_URL: &str = "https://api.github.com";
const SEARCH_ACCEPT: &str = "application/vnd.github.cloak-preview+json";
const API_ACCEPT: &str = "application/vnd.github+json";
const PER_PAGE: usize = 100;
/// Search returns at most 1000 results.
const MAX_SEARCH_PAGES: u32 = 10;
const MAX_EVENT_PAGES: u32 = 10;

pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    username: String,
    base_url: String,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("token", &"[REDACTED]")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client()?,
            token: token.into(),
            username: username.into(),
            base_url: GITHUB_API_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, accept)
    }

    async fn search_commits(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SearchHit>, SourceError> {
        let query = format!(
            "author:{} author-date:{}..{}",
            self.username,
            start.format("%Y-%m-%dT%H:%M:%SZ"),
            end.format("%Y-%m-%dT%H:%M:%SZ"),
        );
        let url = format!("{}/search/commits", self.base_url);
        let per_page = PER_PAGE.to_string();

        let mut hits = Vec::new();
        for page in 1..=MAX_SEARCH_PAGES {
            let page = page.to_string();
            let request = self.get(&url, SEARCH_ACCEPT).query(&[
                ("q", query.as_str()),
                ("sort", "author-date"),
                ("order", "asc"),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ]);
            let body = read_body(request.send().await?, parse_github_error).await?;
            let (page_hits, total) = parse_search_page(&body)?;
            let last_page = page_hits.len() < PER_PAGE;
            hits.extend(page_hits);
            if last_page || hits.len() >= total {
                break;
            }
        }
        Ok(hits)
    }

    /// Line stats for one commit. Failures only cost the metrics.
    async fn commit_stats(&self, api_url: &str) -> Option<CommitStats> {
        let result: Result<CommitStats, SourceError> = async {
            let response = self.get(api_url, API_ACCEPT).send().await?;
            let body = read_body(response, parse_github_error).await?;
            parse_commit_stats(&body)
        }
        .await;
        match result {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::warn!(url = api_url, error = %err, "failed to fetch commit stats");
                None
            }
        }
    }

    async fn push_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let url = format!("{}/users/{}/events", self.base_url, self.username);
        let mut records = Vec::new();
        for page in 1..=MAX_EVENT_PAGES {
            let request = self.get(&url, API_ACCEPT).query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = request.send().await?;
            // The feed is best-effort; stop quietly on errors past the first page
            if page > 1 && !response.status().is_success() {
                break;
            }
            let body = read_body(response, parse_github_error).await?;
            let parsed = parse_events_page(&body, start, end)?;
            records.extend(parsed.records);
            if parsed.exhausted {
                break;
            }
        }
        Ok(records)
    }
}

impl SourceClient for GitHubClient {
    fn source(&self) -> Source {
        Source::Commit
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>, SourceError> {
        let (start, end) = range.bounds(&Local);
        let hits = self.search_commits(start, end).await?;
        tracing::debug!(count = hits.len(), "commit search results");

        if hits.is_empty() {
            tracing::debug!("commit search empty, falling back to push events");
            return self.push_events(start, end).await;
        }

        let mut records = Vec::with_capacity(hits.len());
        for hit in hits {
            let stats = match hit.api_url.as_deref() {
                Some(url) => self.commit_stats(url).await,
                None => None,
            };
            records.push(RawRecord::Commit(CommitRecord {
                repo: hit.repo,
                sha: hit.sha,
                message: hit.message,
                authored_at: hit.authored_at,
                additions: stats.map(|s| s.additions),
                deletions: stats.map(|s| s.deletions),
            }));
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchHit {
    sha: String,
    api_url: Option<String>,
    repo: String,
    message: Option<String>,
    authored_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommitStats {
    additions: u64,
    deletions: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    sha: String,
    url: Option<String>,
    commit: SearchCommit,
    repository: Option<Repository>,
}

#[derive(Deserialize)]
struct SearchCommit {
    message: Option<String>,
    author: Option<Signature>,
}

#[derive(Deserialize)]
struct Signature {
    date: Option<String>,
}

#[derive(Deserialize)]
struct Repository {
    full_name: String,
}

fn parse_search_page(body: &str) -> Result<(Vec<SearchHit>, usize), SourceError> {
    let response: SearchResponse = serde_json::from_str(body).map_err(SourceError::invalid)?;
    let hits = response
        .items
        .into_iter()
        .map(|item| SearchHit {
            sha: item.sha,
            api_url: item.url,
            repo: item
                .repository
                .map_or_else(|| "unknown".to_string(), |r| r.full_name),
            message: item.commit.message,
            authored_at: item.commit.author.and_then(|a| a.date),
        })
        .collect();
    Ok((hits, response.total_count))
}

fn parse_commit_stats(body: &str) -> Result<CommitStats, SourceError> {
    #[derive(Deserialize)]
    struct Detail {
        stats: Option<Stats>,
    }

    #[derive(Deserialize)]
    struct Stats {
        #[serde(default)]
        additions: u64,
        #[serde(default)]
        deletions: u64,
    }

    let detail: Detail = serde_json::from_str(body).map_err(SourceError::invalid)?;
    let stats = detail
        .stats
        .ok_or_else(|| SourceError::InvalidResponse("commit has no stats".to_string()))?;
    Ok(CommitStats {
        additions: stats.additions,
        deletions: stats.deletions,
    })
}

#[derive(Debug)]
struct EventsPage {
    records: Vec<RawRecord>,
    /// An event older than the window was seen, or the page was short.
    exhausted: bool,
}

#[derive(Deserialize)]
struct ApiEvent {
    #[serde(rename = "type")]
    kind: String,
    created_at: String,
    repo: Option<EventRepo>,
    #[serde(default)]
    payload: EventPayload,
}

#[derive(Deserialize)]
struct EventRepo {
    name: String,
}

#[derive(Default, Deserialize)]
struct EventPayload {
    #[serde(default)]
    commits: Vec<PushedCommit>,
}

#[derive(Deserialize)]
struct PushedCommit {
    sha: String,
    message: Option<String>,
}

/// Extracts pushed commits in `[start, end)`. Events arrive newest first.
fn parse_events_page(
    body: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<EventsPage, SourceError> {
    let events: Vec<ApiEvent> = serde_json::from_str(body).map_err(SourceError::invalid)?;
    let mut records = Vec::new();
    let mut exhausted = events.len() < PER_PAGE;

    for event in events {
        if event.kind != "PushEvent" {
            continue;
        }
        let Ok(created) = DateTime::parse_from_rfc3339(&event.created_at) else {
            tracing::debug!(value = %event.created_at, "skipping event with bad timestamp");
            continue;
        };
        let created = created.with_timezone(&Utc);
        if created < start {
            exhausted = true;
            break;
        }
        if created >= end {
            continue;
        }

        let repo = event
            .repo
            .map_or_else(|| "unknown".to_string(), |r| r.name);
        records.extend(event.payload.commits.into_iter().map(|commit| {
            RawRecord::Commit(CommitRecord {
                repo: repo.clone(),
                sha: commit.sha,
                message: commit.message,
                authored_at: Some(event.created_at.clone()),
                additions: None,
                deletions: None,
            })
        }));
    }

    Ok(EventsPage { records, exhausted })
}

fn parse_github_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.message)
}
