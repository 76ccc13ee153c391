//! End-to-end tests driving the `worklog` binary.
//!
//! Each test runs with an isolated HOME and `TZ=UTC`, so only the config file
//! it writes is visible and local dates match the fixture timestamps.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rusqlite::{Connection, params};
use tempfile::TempDir;

const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
// 2025-01-29T09:00:00Z
const NINE_AM_UNIX: i64 = 1_738_141_200;

fn worklog_binary() -> String {
    env!("CARGO_BIN_EXE_worklog").to_string()
}

fn worklog_with_env(home: &Path, envs: &[(&str, &str)], args: &[&str]) -> Output {
    Command::new(worklog_binary())
        .env_clear()
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("TZ", "UTC")
        .envs(envs.iter().copied())
        .args(args)
        .output()
        .expect("failed to run worklog")
}

fn worklog(home: &Path, args: &[&str]) -> Output {
    worklog_with_env(home, &[], args)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Creates a Chrome-style history database with two visits on 2025-01-29
/// and one internal page that should be skipped.
fn history_fixture(dir: &Path) -> PathBuf {
    let path = dir.join("History");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE urls (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR);
        CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER NOT NULL, visit_time INTEGER NOT NULL);
        ",
    )
    .unwrap();
    let visits = [
        ("https://docs.rs/tokio", "tokio - Rust", NINE_AM_UNIX),
        ("chrome://settings", "Settings", NINE_AM_UNIX + 60),
        ("https://github.com/acme/api/pull/7", "Fix parser by octocat", NINE_AM_UNIX + 3_600),
    ];
    for (id, (url, title, unix)) in visits.iter().enumerate() {
        conn.execute(
            "INSERT INTO urls (id, url, title) VALUES (?1, ?2, ?3)",
            params![id, url, title],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO visits (url, visit_time) VALUES (?1, ?2)",
            params![id, (unix + WEBKIT_EPOCH_OFFSET_SECS) * 1_000_000],
        )
        .unwrap();
    }
    path
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("worklog.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn chrome_config(temp: &TempDir) -> PathBuf {
    let history = history_fixture(temp.path());
    write_config(
        temp.path(),
        &format!("chrome_history_path = \"{}\"\n", history.display()),
    )
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    let output = worklog(temp.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["day", "week", "month", "chat", "setup", "status"] {
        assert!(text.contains(command), "help should mention {command}");
    }
}

#[test]
fn test_report_without_sources_points_at_setup() {
    let temp = TempDir::new().unwrap();
    let output = worklog(temp.path(), &["day", "2025-01-29"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("worklog setup"),
        "stderr was: {}",
        stderr(&output)
    );
}

#[test]
fn test_half_configured_github_is_fatal() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "github_token = \"ghp_x\"\n");
    let output = worklog(
        temp.path(),
        &["--config", config.to_str().unwrap(), "--date", "2025-01-29"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("github_username"));
    assert!(!stderr(&output).contains("ghp_x"));
}

#[test]
fn test_day_report_from_chrome_history() {
    let temp = TempDir::new().unwrap();
    let config = chrome_config(&temp);
    let output = worklog(
        temp.path(),
        &["--config", config.to_str().unwrap(), "--date", "2025-01-29"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.starts_with("WORK SUMMARY: Wednesday, Jan 29, 2025\n"));
    assert!(text.contains("SEARCH HISTORY"));
    assert!(text.contains("  09:00  tokio - Rust\n"));
    assert!(text.contains("  10:00  Fix parser by octocat\n"));
    assert!(!text.contains("Settings"));
    assert!(text.contains("Pages visited:    2"));
    assert!(!text.contains("WARNINGS"));
}

#[test]
fn test_json_report_from_chrome_history() {
    let temp = TempDir::new().unwrap();
    let config = chrome_config(&temp);
    let output = worklog(
        temp.path(),
        &["--config", config.to_str().unwrap(), "day", "2025-01-29", "--json"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["range"]["start"], "2025-01-29");
    assert_eq!(json["range"]["end"], "2025-01-29");
    assert_eq!(json["fetched"], serde_json::json!(["history"]));
    assert_eq!(json["summary"]["counts_by_source"]["history"], 2);
    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["title"], "tokio - Rust");
    assert_eq!(events[0]["detail"], "https://docs.rs/tokio");
    assert_eq!(events[0]["timestamp"], "2025-01-29T09:00:00Z");
    assert!(json["warnings"].as_array().unwrap().is_empty());
    assert!(json["generated_at"].is_string());
}

#[test]
fn test_other_days_are_empty() {
    let temp = TempDir::new().unwrap();
    let config = chrome_config(&temp);
    let output = worklog(
        temp.path(),
        &["--config", config.to_str().unwrap(), "day", "2025-01-30"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("  No search history found.\n"));
}

#[test]
fn test_missing_history_file_is_a_warning() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope").join("History");
    let config = write_config(
        temp.path(),
        &format!("chrome_history_path = \"{}\"\n", missing.display()),
    );
    let output = worklog(
        temp.path(),
        &["--config", config.to_str().unwrap(), "week", "2025-W05"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.starts_with("WORK SUMMARY: Week 5, 2025\n2025-01-27 to 2025-02-02\n"));
    assert!(text.contains("No sources returned data."));
    assert!(text.contains("- Search History unavailable: "));
}

#[test]
fn test_summarize_requires_api_key() {
    let temp = TempDir::new().unwrap();
    let config = chrome_config(&temp);
    let output = worklog(
        temp.path(),
        &["--config", config.to_str().unwrap(), "--summarize"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("anthropic_api_key"));
}

#[test]
fn test_status_shows_configured_sources() {
    let temp = TempDir::new().unwrap();
    let config = chrome_config(&temp);
    let output = worklog(temp.path(), &["--config", config.to_str().unwrap(), "status"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("- Search History: "));
    assert!(text.contains("- GitHub Commits: not configured"));
    assert!(text.contains("Ready: 1 sources"));
}

#[test]
fn test_setup_keeps_file_values_without_environment_overrides() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "linear_api_key = \"lin_api_file\"\n");
    // stdin is closed, so every prompt keeps its current value
    let output = worklog_with_env(
        temp.path(),
        &[("WORKLOG_SLACK_TOKEN", "xoxp-from-env")],
        &["--config", config.to_str().unwrap(), "setup"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Configuration saved to"));

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("linear_api_key = \"lin_api_file\""));
    assert!(!saved.contains("xoxp-from-env"));
    assert!(!saved.contains("slack_token"));
}
