//! OAuth access tokens for Google APIs.
//!
//! The calendar client only needs a bearer token; how that token stays valid
//! is hidden behind [`TokenProvider`]. [`StoredToken`] keeps an
//! authorized-user JSON file (the format Google's client libraries write) and
//! refreshes it in place when it is about to expire.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{http_client, read_body};
use crate::error::SourceError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Tokens this close to expiry are refreshed up front.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Supplies a bearer token that is valid right now.
pub trait TokenProvider: Send + Sync {
    fn valid_token(&self) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// A fixed token, for callers that manage refresh themselves.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"[REDACTED]").finish()
    }
}

impl TokenProvider for StaticToken {
    async fn valid_token(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}

/// Contents of an authorized-user token file.
///
/// Unknown keys (scopes, account, universe domain) are carried through
/// untouched when the file is rewritten.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl AuthorizedUser {
    /// True when the access token is missing or expires within the skew.
    ///
    /// A token without an expiry is assumed valid.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().is_none_or(str::is_empty) {
            return true;
        }
        let Some(expiry) = self.expiry.as_deref() else {
            return false;
        };
        parse_expiry(expiry).is_none_or(|at| at - Duration::seconds(EXPIRY_SKEW_SECS) <= now)
    }

    fn apply_refresh(&mut self, refreshed: RefreshResponse, now: DateTime<Utc>) {
        self.token = Some(refreshed.access_token);
        self.expiry = Some(
            (now + Duration::seconds(refreshed.expires_in))
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        if let Some(refresh_token) = refreshed.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

/// Google writes expiry without an offset; treat that as UTC.
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|dt| dt.and_utc())
        })
        .ok()
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

const fn default_expires_in() -> i64 {
    3600
}

fn parse_oauth_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| match payload.error_description {
            Some(description) => format!("{}: {description}", payload.error),
            None => payload.error,
        })
}

/// Token provider backed by an authorized-user JSON file.
pub struct StoredToken {
    http: reqwest::Client,
    path: PathBuf,
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StoredToken {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client()?,
            path: path.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<AuthorizedUser, SourceError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    what: "Google token file",
                    path: self.path.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&contents)
            .map_err(|err| SourceError::Auth(format!("unreadable token file: {err}")))
    }

    async fn refresh(&self, user: &mut AuthorizedUser) -> Result<(), SourceError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            user.refresh_token.clone(),
            user.client_id.clone(),
            user.client_secret.clone(),
        ) else {
            return Err(SourceError::Auth(
                "token expired and cannot be refreshed; run `worklog setup`".to_string(),
            ));
        };

        tracing::debug!(token_uri = %user.token_uri, "refreshing Google access token");
        let response = self
            .http
            .post(&user.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await?;
        let body = read_body(response, parse_oauth_error)
            .await
            .map_err(|err| match err {
                SourceError::Api { message } => SourceError::Auth(message),
                other => other,
            })?;
        let refreshed: RefreshResponse = serde_json::from_str(&body).map_err(SourceError::invalid)?;
        user.apply_refresh(refreshed, Utc::now());
        Ok(())
    }

    async fn store(&self, user: &AuthorizedUser) -> Result<(), SourceError> {
        let contents = serde_json::to_string_pretty(user).map_err(SourceError::invalid)?;
        tokio::fs::write(&self.path, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}

impl TokenProvider for StoredToken {
    async fn valid_token(&self) -> Result<String, SourceError> {
        let mut user = self.load().await?;
        if user.needs_refresh(Utc::now()) {
            self.refresh(&mut user).await?;
            self.store(&user).await?;
        }
        user.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::Auth("token file has no access token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(token: Option<&str>, expiry: Option<&str>) -> AuthorizedUser {
        serde_json::from_value(serde_json::json!({
            "token": token,
            "refresh_token": "refresh-me",
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "shh",
            "expiry": expiry,
            "scopes": ["https://www.googleapis.com/auth/calendar.readonly"],
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn fresh_token_does_not_need_refresh() {
        assert!(!user(Some("abc"), Some("2025-01-29T13:00:00.000000Z")).needs_refresh(now()));
        assert!(!user(Some("abc"), None).needs_refresh(now()));
    }

    #[test]
    fn token_within_skew_needs_refresh() {
        assert!(user(Some("abc"), Some("2025-01-29T12:00:30Z")).needs_refresh(now()));
        assert!(user(Some("abc"), Some("2025-01-29T11:00:00")).needs_refresh(now()));
        assert!(user(None, Some("2025-01-29T13:00:00Z")).needs_refresh(now()));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", user(Some("abc"), None));
        assert!(!rendered.contains("abc"));
        assert!(!rendered.contains("refresh-me"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let json = serde_json::to_value(user(Some("abc"), None)).unwrap();
        assert_eq!(json["scopes"][0], "https://www.googleapis.com/auth/calendar.readonly");
        assert_eq!(json["token_uri"], DEFAULT_TOKEN_URI);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_written_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("google_token.json");
        let mut stale = user(Some("old-token"), Some("2020-01-01T00:00:00Z"));
        stale.token_uri = format!("{}/token", server.uri());
        std::fs::write(&file, serde_json::to_string(&stale).unwrap()).unwrap();

        let provider = StoredToken::new(&file).unwrap();
        assert_eq!(provider.valid_token().await.unwrap(), "new-token");

        let saved: AuthorizedUser =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(saved.token.as_deref(), Some("new-token"));
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-me"));
        assert!(!saved.needs_refresh(Utc::now()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn rejected_refresh_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("google_token.json");
        let mut stale = user(None, None);
        stale.token_uri = format!("{}/token", server.uri());
        std::fs::write(&file, serde_json::to_string(&stale).unwrap()).unwrap();

        let err = StoredToken::new(&file).unwrap().valid_token().await.unwrap_err();
        assert!(matches!(err, SourceError::Auth(ref m) if m.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StoredToken::new(dir.path().join("nope.json")).unwrap();
        assert!(matches!(
            provider.valid_token().await,
            Err(SourceError::NotFound { .. })
        ));
    }
}
