//! Messages the user sent on Slack.
//!
//! `search.messages` covers everything searchable. Direct messages and
//! private channels are not always indexed, so their histories are read as
//! well and filtered to the user's own messages. Results are merged on
//! `(ts, channel)`. Either path may fail on its own; the source fails only
//! when both do.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Local, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use wl_core::{DateRange, MessageRecord, RawRecord, Source};

use crate::client::{SourceClient, http_client, read_body};
use crate::error::SourceError;

const SLACK_API_URL: &str = "https://slack.com/api";
const SEARCH_PAGE_SIZE: &str = "100";
const LIST_PAGE_SIZE: &str = "200";
const MAX_SEARCH_PAGES: u32 = 10;
const MAX_CURSOR_PAGES: usize = 10;
const PRIVATE_CONVERSATION_TYPES: &str = "im,mpim,private_channel";
const AUTH_ERRORS: [&str; 5] = [
    "invalid_auth",
    "not_authed",
    "token_revoked",
    "token_expired",
    "account_inactive",
];

pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackClient")
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// A message plus the channel id used for deduplication.
#[derive(Debug)]
struct Sent {
    channel_id: String,
    record: MessageRecord,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client()?,
            token: token.into(),
            base_url: SLACK_API_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .get(format!("{}/{method}", self.base_url))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        let body = read_body(response, |_| None).await?;
        parse_envelope(&body)
    }

    async fn user_id(&self) -> Result<String, SourceError> {
        let auth: AuthTest = self.call("auth.test", &[]).await?;
        Ok(auth.user_id)
    }

    async fn search(
        &self,
        range: &DateRange,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sent>, SourceError> {
        // after:/before: are exclusive and day-granular
        let after = range.start() - Duration::days(1);
        let before = range.end() + Duration::days(1);
        let query = format!(
            "from:me after:{} before:{}",
            after.format("%Y-%m-%d"),
            before.format("%Y-%m-%d")
        );

        let mut sent = Vec::new();
        for page in 1..=MAX_SEARCH_PAGES {
            let page = page.to_string();
            let response: SearchResponse = self
                .call(
                    "search.messages",
                    &[
                        ("query", query.as_str()),
                        ("sort", "timestamp"),
                        ("sort_dir", "asc"),
                        ("count", SEARCH_PAGE_SIZE),
                        ("page", page.as_str()),
                    ],
                )
                .await?;
            let (matches, more) = search_matches(response, start, end);
            sent.extend(matches);
            if !more {
                break;
            }
        }
        Ok(sent)
    }

    async fn private_conversations(&self) -> Result<Vec<Conversation>, SourceError> {
        let mut conversations = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_CURSOR_PAGES {
            let mut query = vec![
                ("types", PRIVATE_CONVERSATION_TYPES),
                ("exclude_archived", "true"),
                ("limit", LIST_PAGE_SIZE),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let response: ConversationsList = self.call("conversations.list", &query).await?;
            conversations.extend(response.channels);
            match response.response_metadata.and_then(Metadata::cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(conversations)
    }

    async fn history(
        &self,
        channel: &str,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryMessage>, SourceError> {
        let oldest = start.timestamp().to_string();
        let latest = end.timestamp().to_string();
        let mut messages = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_CURSOR_PAGES {
            let mut query = vec![
                ("channel", channel),
                ("oldest", oldest.as_str()),
                ("latest", latest.as_str()),
                ("limit", LIST_PAGE_SIZE),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let response: HistoryResponse = self.call("conversations.history", &query).await?;
            messages.extend(
                response
                    .messages
                    .into_iter()
                    .filter(|m| m.user.as_deref() == Some(user_id) && m.subtype.is_none()),
            );
            let next = response
                .has_more
                .then(|| response.response_metadata.and_then(Metadata::cursor))
                .flatten();
            match next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(messages)
    }

    async fn display_name(&self, user: &str) -> Option<String> {
        match self.call::<UserInfo>("users.info", &[("user", user)]).await {
            Ok(info) => info.user.display_name(),
            Err(err) => {
                tracing::debug!(user, error = %err, "failed to resolve DM user");
                None
            }
        }
    }

    async fn conversation_messages(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sent>, SourceError> {
        let conversations = self.private_conversations().await?;
        let mut names: HashMap<String, Option<String>> = HashMap::new();
        let mut sent = Vec::new();

        for conversation in conversations {
            let messages = match self.history(&conversation.id, user_id, start, end).await {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::warn!(channel = %conversation.id, error = %err, "skipping conversation");
                    continue;
                }
            };
            if messages.is_empty() {
                continue;
            }

            let label = if conversation.is_im {
                let peer = conversation.user.clone().unwrap_or_default();
                if !names.contains_key(&peer) {
                    let name = self.display_name(&peer).await;
                    names.insert(peer.clone(), name);
                }
                names
                    .get(&peer)
                    .cloned()
                    .flatten()
                    .map_or_else(|| "DM".to_string(), |name| format!("@{name}"))
            } else {
                conversation.label()
            };

            sent.extend(messages.into_iter().map(|m| Sent {
                channel_id: conversation.id.clone(),
                record: MessageRecord {
                    channel: label.clone(),
                    text: m.text,
                    ts: Some(m.ts),
                },
            }));
        }
        Ok(sent)
    }
}

impl SourceClient for SlackClient {
    fn source(&self) -> Source {
        Source::Message
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>, SourceError> {
        let (start, end) = range.bounds(&Local);
        let user_id = self.user_id().await?;

        let conversations = self.conversation_messages(&user_id, start, end).await;
        let searched = self.search(range, start, end).await;
        let (conversations, searched) = match (conversations, searched) {
            (Err(history_err), Err(search_err)) => {
                tracing::warn!(error = %history_err, "failed to read conversation histories");
                return Err(search_err);
            }
            (conversations, searched) => (
                conversations.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "failed to read conversation histories");
                    Vec::new()
                }),
                searched.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "message search failed");
                    Vec::new()
                }),
            ),
        };
        tracing::debug!(
            conversations = conversations.len(),
            searched = searched.len(),
            "fetched slack messages"
        );

        Ok(dedupe(conversations.into_iter().chain(searched)))
    }
}

/// Keeps the first message for each `(ts, channel)`.
fn dedupe(messages: impl IntoIterator<Item = Sent>) -> Vec<RawRecord> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert((m.record.ts.clone(), m.channel_id.clone())))
        .map(|m| RawRecord::Message(m.record))
        .collect()
}

/// Checks Slack's `ok` flag before decoding the method-specific payload.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    #[derive(Deserialize)]
    struct Envelope {
        ok: bool,
        error: Option<String>,
    }

    let envelope: Envelope = serde_json::from_str(body).map_err(SourceError::invalid)?;
    if !envelope.ok {
        let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
        if AUTH_ERRORS.contains(&error.as_str()) {
            return Err(SourceError::Auth(error));
        }
        return Err(SourceError::Api { message: error });
    }
    serde_json::from_str(body).map_err(SourceError::invalid)
}

/// Whole seconds of a Slack `ts`.
fn ts_secs(ts: &str) -> Option<i64> {
    ts.split('.').next()?.parse().ok()
}

fn search_matches(
    response: SearchResponse,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (Vec<Sent>, bool) {
    let messages = response.messages;
    let more = messages
        .paging
        .is_some_and(|p| p.page < p.pages);
    let sent = messages
        .matches
        .into_iter()
        .filter(|m| {
            ts_secs(&m.ts).is_none_or(|secs| start.timestamp() <= secs && secs < end.timestamp())
        })
        .map(|m| {
            let channel = m.channel.unwrap_or_default();
            Sent {
                channel_id: channel.id.clone(),
                record: MessageRecord {
                    channel: channel.label(),
                    text: m.text,
                    ts: Some(m.ts),
                },
            }
        })
        .collect();
    (sent, more)
}

#[derive(Debug, Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    messages: SearchMessages,
}

#[derive(Deserialize)]
struct SearchMessages {
    #[serde(default)]
    matches: Vec<SearchMatch>,
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    page: u32,
    pages: u32,
}

#[derive(Deserialize)]
struct SearchMatch {
    ts: String,
    text: Option<String>,
    channel: Option<Conversation>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct Conversation {
    #[serde(default)]
    id: String,
    name: Option<String>,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_mpim: bool,
    /// The other party of a DM.
    user: Option<String>,
}

impl Conversation {
    fn label(&self) -> String {
        if self.is_im {
            "DM".to_string()
        } else if self.is_mpim {
            "Group DM".to_string()
        } else {
            self.name
                .as_deref()
                .map_or_else(|| "unknown".to_string(), |name| format!("#{name}"))
        }
    }
}

#[derive(Deserialize)]
struct ConversationsList {
    #[serde(default)]
    channels: Vec<Conversation>,
    response_metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct Metadata {
    next_cursor: Option<String>,
}

impl Metadata {
    fn cursor(self) -> Option<String> {
        self.next_cursor.filter(|c| !c.is_empty())
    }
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    has_more: bool,
    response_metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct HistoryMessage {
    ts: String,
    text: Option<String>,
    user: Option<String>,
    subtype: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    user: SlackUser,
}

#[derive(Deserialize)]
struct SlackUser {
    name: Option<String>,
    #[serde(default)]
    profile: Profile,
}

#[derive(Default, Deserialize)]
struct Profile {
    display_name: Option<String>,
    real_name: Option<String>,
}

impl SlackUser {
    fn display_name(self) -> Option<String> {
        [self.profile.display_name, self.profile.real_name, self.name]
            .into_iter()
            .flatten()
            .find(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn utc(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn envelope_maps_auth_errors() {
        let err = parse_envelope::<AuthTest>(r#"{"ok":false,"error":"invalid_auth"}"#).unwrap_err();
        assert!(matches!(err, SourceError::Auth(ref e) if e == "invalid_auth"));

        let err = parse_envelope::<AuthTest>(r#"{"ok":false,"error":"missing_scope"}"#).unwrap_err();
        assert!(matches!(err, SourceError::Api { ref message } if message == "missing_scope"));

        let ok: AuthTest = parse_envelope(r#"{"ok":true,"user_id":"U1"}"#).unwrap();
        assert_eq!(ok.user_id, "U1");
    }

    #[test]
    fn search_matches_filter_window_and_label_channels() {
        // 1738141200 = 2025-01-29T09:00:00Z
        let response: SearchResponse = serde_json::from_str(
            r#"{"messages": {
                "matches": [
                    {"ts": "1738141200.000100", "text": "shipped",
                     "channel": {"id": "C1", "name": "eng"}},
                    {"ts": "1738141300.000100", "text": "hey",
                     "channel": {"id": "D1", "is_im": true}},
                    {"ts": "1738000000.000100", "text": "too early",
                     "channel": {"id": "C1", "name": "eng"}}
                ],
                "paging": {"page": 1, "pages": 2}
            }}"#,
        )
        .unwrap();
        let (sent, more) = search_matches(
            response,
            utc("2025-01-29T00:00:00Z"),
            utc("2025-01-30T00:00:00Z"),
        );
        assert!(more);
        let labels: Vec<_> = sent.iter().map(|s| s.record.channel.as_str()).collect();
        assert_eq!(labels, vec!["#eng", "DM"]);
    }

    #[test]
    fn dedupe_keeps_first_per_channel_and_ts() {
        let make = |channel_id: &str, label: &str, ts: &str| Sent {
            channel_id: channel_id.to_string(),
            record: MessageRecord {
                channel: label.to_string(),
                text: Some("hi".to_string()),
                ts: Some(ts.to_string()),
            },
        };
        let records = dedupe(vec![
            make("D1", "@alice", "1.000100"),
            make("D1", "DM", "1.000100"),
            make("C1", "#eng", "1.000100"),
        ]);
        assert_eq!(records.len(), 2);
        assert!(matches!(
            &records[0],
            RawRecord::Message(MessageRecord { channel, .. }) if channel == "@alice"
        ));
    }

    #[test]
    fn user_display_name_falls_back() {
        let user: SlackUser = serde_json::from_str(
            r#"{"name":"alice","profile":{"display_name":"","real_name":"Alice Smith"}}"#,
        )
        .unwrap();
        assert_eq!(user.display_name().as_deref(), Some("Alice Smith"));
    }

    fn ok(body: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(body)
    }

    #[tokio::test]
    async fn fetch_merges_history_and_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .respond_with(ok(serde_json::json!({"ok": true, "user_id": "U1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "channels": [{"id": "D1", "is_im": true, "user": "U2"}],
                "response_metadata": {"next_cursor": ""}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(query_param("channel", "D1"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "messages": [
                    {"ts": "1738141300.000100", "text": "mine", "user": "U1"},
                    {"ts": "1738141400.000100", "text": "theirs", "user": "U2"},
                    {"ts": "1738141500.000100", "user": "U1", "subtype": "channel_join"}
                ],
                "has_more": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "user": {"name": "bob", "profile": {"display_name": "Bob"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search.messages"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "messages": {
                    "matches": [
                        {"ts": "1738141300.000100", "text": "mine",
                         "channel": {"id": "D1", "is_im": true}},
                        {"ts": "1738141200.000100", "text": "shipped",
                         "channel": {"id": "C1", "name": "eng"}}
                    ],
                    "paging": {"page": 1, "pages": 1}
                }
            })))
            .mount(&server)
            .await;

        let client = SlackClient::new("xoxp-1").unwrap().with_base_url(server.uri());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 30).unwrap(),
        )
        .unwrap();
        let records = client.fetch(&range).await.unwrap();
        let channels: Vec<_> = records
            .iter()
            .map(|r| match r {
                RawRecord::Message(m) => m.channel.as_str(),
                other => panic!("unexpected record {other:?}"),
            })
            .collect();
        assert_eq!(channels, vec!["@Bob", "#eng"]);
    }

    async fn mount_auth(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .respond_with(ok(serde_json::json!({"ok": true, "user_id": "U1"})))
            .mount(server)
            .await;
    }

    async fn mount_unavailable(server: &MockServer, endpoint: &str) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(server)
            .await;
    }

    async fn mount_dm_history(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "channels": [{"id": "G1", "name": "incident"}]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "messages": [{"ts": "1738141300.000100", "text": "rolled back", "user": "U1"}],
                "has_more": false
            })))
            .mount(server)
            .await;
    }

    async fn mount_search(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/search.messages"))
            .respond_with(ok(serde_json::json!({
                "ok": true,
                "messages": {
                    "matches": [{"ts": "1738141200.000100", "text": "shipped",
                                 "channel": {"id": "C1", "name": "eng"}}],
                    "paging": {"page": 1, "pages": 1}
                }
            })))
            .mount(server)
            .await;
    }

    fn channels(records: &[RawRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|r| match r {
                RawRecord::Message(m) => m.channel.as_str(),
                other => panic!("unexpected record {other:?}"),
            })
            .collect()
    }

    // Wide enough that the fixtures fall inside it in any local timezone
    fn around_jan_29() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 30).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_fails_when_history_and_search_both_fail() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        mount_unavailable(&server, "/conversations.list").await;
        mount_unavailable(&server, "/search.messages").await;

        let client = SlackClient::new("xoxp-1").unwrap().with_base_url(server.uri());
        let err = client.fetch(&around_jan_29()).await.unwrap_err();
        assert!(
            matches!(err, SourceError::Api { ref message } if message.contains("503")),
            "unexpected error {err:?}"
        );
    }

    #[tokio::test]
    async fn search_failure_keeps_conversation_history() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        mount_dm_history(&server).await;
        mount_unavailable(&server, "/search.messages").await;

        let client = SlackClient::new("xoxp-1").unwrap().with_base_url(server.uri());
        let records = client.fetch(&around_jan_29()).await.unwrap();
        assert_eq!(channels(&records), vec!["#incident"]);
    }

    #[tokio::test]
    async fn history_failure_keeps_search_results() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        mount_unavailable(&server, "/conversations.list").await;
        mount_search(&server).await;

        let client = SlackClient::new("xoxp-1").unwrap().with_base_url(server.uri());
        let records = client.fetch(&around_jan_29()).await.unwrap();
        assert_eq!(channels(&records), vec!["#eng"]);
    }

    #[tokio::test]
    async fn revoked_token_fails_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .respond_with(ok(serde_json::json!({"ok": false, "error": "token_revoked"})))
            .mount(&server)
            .await;

        let client = SlackClient::new("xoxp-1").unwrap().with_base_url(server.uri());
        let range = DateRange::day(NaiveDate::from_ymd_opt(2025, 1, 29).unwrap());
        assert!(matches!(
            client.fetch(&range).await,
            Err(SourceError::Auth(_))
        ));
    }
}
