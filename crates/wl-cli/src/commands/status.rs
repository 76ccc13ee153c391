//! Status command for showing which sources are configured.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use wl_core::Source;
use wl_sources::chrome::default_history_path;

use crate::{Config, default_config_file};

const NOT_CONFIGURED: &str = "not configured";

fn describe_source(config: &Config, source: Source) -> String {
    let set = |value: Option<&String>| value.is_some_and(|v| !v.trim().is_empty());
    match source {
        Source::Calendar => config
            .google_token_path
            .as_ref()
            .map_or_else(|| NOT_CONFIGURED.to_string(), |p| format!("token {}", p.display())),
        Source::History => {
            let path = config.chrome_history_path.clone().or_else(|| {
                config
                    .chrome_profile
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .and_then(default_history_path)
            });
            path.map_or_else(|| NOT_CONFIGURED.to_string(), |p| p.display().to_string())
        }
        Source::Commit => match (
            set(config.github_token.as_ref()),
            config.github_username.as_deref(),
        ) {
            (true, Some(user)) => format!("as {user}"),
            (true, None) => "token set, username missing".to_string(),
            (false, Some(_)) => "username set, token missing".to_string(),
            (false, None) => NOT_CONFIGURED.to_string(),
        },
        Source::Message if set(config.slack_token.as_ref()) => "configured".to_string(),
        Source::Issue if set(config.linear_api_key.as_ref()) => "configured".to_string(),
        Source::Message | Source::Issue => NOT_CONFIGURED.to_string(),
    }
}

pub fn run<W: Write>(writer: &mut W, config: &Config, config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).or_else(default_config_file);

    writeln!(writer, "Worklog status")?;
    match path {
        Some(path) if path.exists() => writeln!(writer, "Config: {}", path.display())?,
        Some(path) => writeln!(writer, "Config: {} (missing)", path.display())?,
        None => writeln!(writer, "Config: (none)")?,
    }

    writeln!(writer, "Sources:")?;
    for source in Source::ALL {
        writeln!(writer, "- {}: {}", source.label(), describe_source(config, source))?;
    }

    match config.anthropic_key() {
        Some(_) => writeln!(writer, "AI summaries: {}", config.model)?,
        None => writeln!(writer, "AI summaries: {NOT_CONFIGURED}")?,
    }

    match config.source_settings().build_clients() {
        Ok(clients) => writeln!(writer, "Ready: {} sources", clients.len())?,
        Err(err) => writeln!(writer, "Problem: {err}")?,
    }

    Ok(())
}
