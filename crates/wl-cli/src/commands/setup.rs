//! Interactive setup wizard.
//!
//! Walks through each source, keeping the current value when the answer is
//! left blank, and writes the result as TOML readable only by the owner.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::Config;

/// Asks for one value. A blank answer keeps `current`.
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    current: Option<&str>,
    secret: bool,
) -> Result<Option<String>> {
    match current {
        Some(value) if secret => write!(output, "   {label} [{}]: ", mask(value))?,
        Some(value) => write!(output, "   {label} [{value}]: ")?,
        None => write!(output, "   {label}: ")?,
    }
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        current.map(str::to_string)
    } else {
        Some(answer.to_string())
    })
}

fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}...")
}

/// Runs the wizard against `input`/`output`, starting from `existing`.
pub fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, existing: &Config) -> Result<Config> {
    let mut config = existing.clone();

    writeln!(output, "Worklog Setup")?;
    writeln!(output, "Press Enter to keep the value shown in brackets.")?;

    writeln!(output)?;
    writeln!(output, "1. GitHub")?;
    writeln!(output, "   Create a token at https://github.com/settings/tokens (scope: repo).")?;
    config.github_token = ask(input, output, "Personal access token", existing.github_token.as_deref(), true)?;
    config.github_username = ask(input, output, "Username", existing.github_username.as_deref(), false)?;

    writeln!(output)?;
    writeln!(output, "2. Google Calendar")?;
    writeln!(output, "   Path to an authorized-user token JSON (with refresh_token).")?;
    let google = existing
        .google_token_path
        .as_ref()
        .map(|p| p.display().to_string());
    config.google_token_path = ask(input, output, "Token file", google.as_deref(), false)?.map(Into::into);

    writeln!(output)?;
    writeln!(output, "3. Chrome history")?;
    let profile = existing
        .chrome_profile
        .as_deref()
        .or(Some(wl_sources::chrome::DEFAULT_PROFILE));
    config.chrome_profile = ask(input, output, "Profile name", profile, false)?;

    writeln!(output)?;
    writeln!(output, "4. Slack (optional)")?;
    writeln!(output, "   User OAuth token with search:read from https://api.slack.com/apps.")?;
    config.slack_token = ask(input, output, "User token", existing.slack_token.as_deref(), true)?;

    writeln!(output)?;
    writeln!(output, "5. Linear (optional)")?;
    writeln!(output, "   Personal API key from Linear settings.")?;
    config.linear_api_key = ask(input, output, "API key", existing.linear_api_key.as_deref(), true)?;

    writeln!(output)?;
    writeln!(output, "6. Anthropic (optional, for --summarize and chat)")?;
    config.anthropic_api_key = ask(input, output, "API key", existing.anthropic_api_key.as_deref(), true)?;
    if let Some(model) = ask(input, output, "Model", Some(&existing.model), false)? {
        config.model = model;
    }

    Ok(config)
}

/// Writes `config` to `path`, creating the directory with mode 0700 and the
/// file with mode 0600.
pub fn save(config: &Config, path: &Path) -> Result<()> {
    // Only a directory created here gets its mode changed
    if let Some(parent) = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty() && !p.exists())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        restrict(parent, 0o700)?;
    }

    let text = toml::to_string_pretty(config).context("failed to serialize configuration")?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    restrict(path, 0o600)
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Runs the wizard on the terminal and saves to `path`.
pub fn run(existing: &Config, path: &Path) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let config = prompt(&mut stdin.lock(), &mut stdout, existing)?;
    save(&config, path)?;
    writeln!(stdout)?;
    writeln!(stdout, "Configuration saved to {}", path.display())?;
    Ok(())
}
