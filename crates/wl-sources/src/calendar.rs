//! Google Calendar events from the user's primary calendar.

use chrono::{Local, SecondsFormat};
use serde::Deserialize;
use wl_core::{CalendarRecord, DateRange, RawRecord, Source};

use crate::client::{SourceClient, http_client, read_body};
use crate::error::SourceError;
use crate::token::TokenProvider;

const CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: &str = "250";
const MAX_PAGES: usize = 20;

/// Client for the Calendar v3 `events.list` endpoint.
#[derive(Debug)]
pub struct CalendarClient<P> {
    http: reqwest::Client,
    tokens: P,
    base_url: String,
}

impl<P: TokenProvider> CalendarClient<P> {
    pub fn new(tokens: P) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client()?,
            tokens,
            base_url: CALENDAR_API_URL.to_string(),
        })
    }

    /// Points the client at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl<P: TokenProvider> SourceClient for CalendarClient<P> {
    fn source(&self) -> Source {
        Source::Calendar
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>, SourceError> {
        let token = self.tokens.valid_token().await?;
        let (start, end) = range.bounds(&Local);
        let time_min = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let url = format!("{}/calendars/primary/events", self.base_url);

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut request = self.http.get(&url).bearer_auth(&token).query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", PAGE_SIZE),
            ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let body = read_body(request.send().await?, parse_google_error).await?;
            let page = parse_events_page(&body)?;
            tracing::debug!(count = page.records.len(), "fetched calendar page");
            records.extend(page.records);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(records),
            }
        }

        tracing::warn!(pages = MAX_PAGES, "calendar results truncated");
        Ok(records)
    }
}

#[derive(Debug)]
struct EventsPage {
    records: Vec<RawRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    summary: Option<String>,
    location: Option<String>,
    status: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventTime {
    fn into_value(self) -> Option<String> {
        self.date_time.or(self.date)
    }
}

fn parse_events_page(body: &str) -> Result<EventsPage, SourceError> {
    let response: EventsResponse = serde_json::from_str(body).map_err(SourceError::invalid)?;
    let records = response
        .items
        .into_iter()
        .filter(|event| event.status.as_deref() != Some("cancelled"))
        .map(|event| {
            RawRecord::Calendar(CalendarRecord {
                summary: event.summary,
                start: event.start.and_then(EventTime::into_value),
                end: event.end.and_then(EventTime::into_value),
                location: event.location,
            })
        })
        .collect();
    Ok(EventsPage {
        records,
        next_page_token: response.next_page_token,
    })
}

fn parse_google_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.error.message)
}
