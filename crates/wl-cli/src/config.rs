//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wl_sources::SourceSettings;

/// Application configuration.
///
/// Every source is optional; the ones left unset are skipped when fetching.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    /// Google OAuth authorized-user token file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_token_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_profile: Option<String>,
    /// Explicit Chrome `History` file; overrides `chrome_profile`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_history_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    /// Claude model for `--summarize` and `chat`.
    pub model: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("github_token", &redact(&self.github_token))
            .field("github_username", &self.github_username)
            .field("google_token_path", &self.google_token_path)
            .field("chrome_profile", &self.chrome_profile)
            .field("chrome_history_path", &self.chrome_history_path)
            .field("slack_token", &redact(&self.slack_token))
            .field("linear_api_key", &redact(&self.linear_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("model", &self.model)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            github_username: None,
            google_token_path: None,
            chrome_profile: None,
            chrome_history_path: None,
            slack_token: None,
            linear_api_key: None,
            anthropic_api_key: None,
            model: wl_llm::DEFAULT_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the default file, then `config_path`, then
    /// `WORKLOG_*` environment variables.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = default_config_file() {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // WORKLOG_GITHUB_TOKEN, WORKLOG_MODEL, ...
        figment = figment.merge(Env::prefixed("WORKLOG_"));

        figment.extract()
    }

    /// Loads a single config file over the defaults, ignoring the
    /// environment. A missing file yields the defaults.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_file(path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            github_token: self.github_token.clone(),
            github_username: self.github_username.clone(),
            google_token_path: self.google_token_path.clone(),
            chrome_profile: self.chrome_profile.clone(),
            chrome_history_path: self.chrome_history_path.clone(),
            slack_token: self.slack_token.clone(),
            linear_api_key: self.linear_api_key.clone(),
        }
    }

    /// The Anthropic key, if set to something other than whitespace.
    pub fn anthropic_key(&self) -> Option<&str> {
        self.anthropic_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Returns the platform-specific config directory for worklog.
///
/// On Linux: `~/.config/worklog`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("worklog"))
}

/// The config file read by default and written by `worklog setup`.
pub fn default_config_file() -> Option<PathBuf> {
    dirs_config_path().map(|dir| dir.join("config.toml"))
}
