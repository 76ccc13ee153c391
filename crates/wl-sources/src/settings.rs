//! Turning credentials into the list of clients to run.

use std::fmt;
use std::path::PathBuf;

use wl_core::{DateRange, RawRecord, Source};

use crate::calendar::CalendarClient;
use crate::chrome::ChromeClient;
use crate::client::SourceClient;
use crate::error::{ConfigurationError, SourceError};
use crate::github::GitHubClient;
use crate::linear::LinearClient;
use crate::slack::SlackClient;
use crate::token::StoredToken;

/// Credentials and locations for every source. Unset or blank values leave
/// the source out.
#[derive(Clone, Default)]
pub struct SourceSettings {
    pub github_token: Option<String>,
    pub github_username: Option<String>,
    pub google_token_path: Option<PathBuf>,
    pub chrome_profile: Option<String>,
    pub chrome_history_path: Option<PathBuf>,
    pub slack_token: Option<String>,
    pub linear_api_key: Option<String>,
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("SourceSettings")
            .field("github_token", &redact(&self.github_token))
            .field("github_username", &self.github_username)
            .field("google_token_path", &self.google_token_path)
            .field("chrome_profile", &self.chrome_profile)
            .field("chrome_history_path", &self.chrome_history_path)
            .field("slack_token", &redact(&self.slack_token))
            .field("linear_api_key", &redact(&self.linear_api_key))
            .finish()
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl SourceSettings {
    /// Builds one client per configured source, in [`Source`] order.
    pub fn build_clients(&self) -> Result<Vec<ConfiguredSource>, ConfigurationError> {
        let init = |source: Source| {
            move |err: SourceError| ConfigurationError::ClientInit {
                kind: source,
                reason: err.to_string(),
            }
        };
        let mut clients = Vec::new();

        if let Some(path) = self.google_token_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            let tokens = StoredToken::new(path).map_err(init(Source::Calendar))?;
            let client = CalendarClient::new(tokens).map_err(init(Source::Calendar))?;
            clients.push(ConfiguredSource::Calendar(client));
        }

        if let Some(path) = self.chrome_history_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            clients.push(ConfiguredSource::History(ChromeClient::new(path)));
        } else if let Some(profile) = present(self.chrome_profile.as_ref()) {
            match ChromeClient::for_profile(profile) {
                Some(client) => clients.push(ConfiguredSource::History(client)),
                None => tracing::warn!(profile, "cannot locate Chrome profile directory"),
            }
        }

        match (
            present(self.github_token.as_ref()),
            present(self.github_username.as_ref()),
        ) {
            (Some(token), Some(username)) => {
                let client = GitHubClient::new(token, username).map_err(init(Source::Commit))?;
                clients.push(ConfiguredSource::Commit(client));
            }
            (Some(_), None) => {
                return Err(ConfigurationError::Incomplete {
                    present: "github_token",
                    missing: "github_username",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigurationError::Incomplete {
                    present: "github_username",
                    missing: "github_token",
                });
            }
            (None, None) => {}
        }

        if let Some(token) = present(self.slack_token.as_ref()) {
            let client = SlackClient::new(token).map_err(init(Source::Message))?;
            clients.push(ConfiguredSource::Message(client));
        }

        if let Some(key) = present(self.linear_api_key.as_ref()) {
            let client = LinearClient::new(key).map_err(init(Source::Issue))?;
            clients.push(ConfiguredSource::Issue(client));
        }

        if clients.is_empty() {
            return Err(ConfigurationError::NoSources);
        }
        Ok(clients)
    }
}

/// Any of the built-in clients, so a mixed list can run through one pipeline.
#[derive(Debug)]
pub enum ConfiguredSource {
    Calendar(CalendarClient<StoredToken>),
    History(ChromeClient),
    Commit(GitHubClient),
    Message(SlackClient),
    Issue(LinearClient),
}

impl SourceClient for ConfiguredSource {
    fn source(&self) -> Source {
        match self {
            Self::Calendar(c) => c.source(),
            Self::History(c) => c.source(),
            Self::Commit(c) => c.source(),
            Self::Message(c) => c.source(),
            Self::Issue(c) => c.source(),
        }
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>, SourceError> {
        match self {
            Self::Calendar(c) => c.fetch(range).await,
            Self::History(c) => c.fetch(range).await,
            Self::Commit(c) => c.fetch(range).await,
            Self::Message(c) => c.fetch(range).await,
            Self::Issue(c) => c.fetch(range).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(settings: &SourceSettings) -> Vec<Source> {
        settings
            .build_clients()
            .unwrap()
            .iter()
            .map(SourceClient::source)
            .collect()
    }

    #[test]
    fn nothing_configured_is_an_error() {
        let err = SourceSettings::default().build_clients().unwrap_err();
        assert_eq!(err, ConfigurationError::NoSources);
        assert!(err.to_string().contains("worklog setup"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings = SourceSettings {
            slack_token: Some("  ".into()),
            chrome_profile: Some(String::new()),
            ..SourceSettings::default()
        };
        assert_eq!(
            settings.build_clients().unwrap_err(),
            ConfigurationError::NoSources
        );
    }

    #[test]
    fn github_token_without_username_is_incomplete() {
        let settings = SourceSettings {
            github_token: Some("ghp_x".into()),
            linear_api_key: Some("lin".into()),
            ..SourceSettings::default()
        };
        assert_eq!(
            settings.build_clients().unwrap_err(),
            ConfigurationError::Incomplete {
                present: "github_token",
                missing: "github_username"
            }
        );
    }

    #[test]
    fn builds_clients_in_source_order() {
        let settings = SourceSettings {
            github_token: Some("ghp_x".into()),
            github_username: Some("octocat".into()),
            google_token_path: Some(PathBuf::from("/tmp/token.json")),
            chrome_history_path: Some(PathBuf::from("/tmp/History")),
            slack_token: Some("xoxp".into()),
            linear_api_key: Some("lin".into()),
            ..SourceSettings::default()
        };
        assert_eq!(sources(&settings), Source::ALL.to_vec());
    }

    #[test]
    fn explicit_history_path_wins_over_profile() {
        let settings = SourceSettings {
            chrome_profile: Some("Profile 1".into()),
            chrome_history_path: Some(PathBuf::from("/tmp/History")),
            ..SourceSettings::default()
        };
        let clients = settings.build_clients().unwrap();
        match &clients[0] {
            ConfiguredSource::History(c) => assert_eq!(c.path(), PathBuf::from("/tmp/History")),
            other => panic!("unexpected client {other:?}"),
        }
    }

    #[test]
    fn google_token_file_is_read_at_fetch_time() {
        let temp = tempfile::tempdir().unwrap();
        let settings = SourceSettings {
            google_token_path: Some(temp.path().join("missing.json")),
            ..SourceSettings::default()
        };
        assert_eq!(sources(&settings), vec![Source::Calendar]);
    }

    #[test]
    fn debug_redacts_tokens() {
        let settings = SourceSettings {
            slack_token: Some("xoxp-secret".into()),
            ..SourceSettings::default()
        };
        assert!(!format!("{settings:?}").contains("xoxp-secret"));
    }
}
