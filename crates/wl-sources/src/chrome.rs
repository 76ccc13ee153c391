//! Browser history read straight from Chrome's `History` SQLite file.
//!
//! Chrome keeps the database open (and often locked) while it runs. The
//! reader first tries a read-only connection; if that reports the database
//! busy or locked it copies the file, plus any `-wal` sidecar, into a
//! temporary directory and reads the snapshot instead.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use rusqlite::{Connection, ErrorCode, OpenFlags, params};
use wl_core::{DateRange, HistoryRecord, RawRecord, Source};

use crate::client::SourceClient;
use crate::error::SourceError;

/// Seconds between 1601-01-01 (WebKit epoch) and 1970-01-01.
const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);
const SKIPPED_SCHEMES: [&str; 2] = ["chrome://", "chrome-extension://"];
pub const DEFAULT_PROFILE: &str = "Default";

/// Reads visits from a Chrome profile's history database.
#[derive(Debug, Clone)]
pub struct ChromeClient {
    path: PathBuf,
}

impl ChromeClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Client for a named profile in the platform's default Chrome directory.
    pub fn for_profile(profile: &str) -> Option<Self> {
        default_history_path(profile).map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceClient for ChromeClient {
    fn source(&self) -> Source {
        Source::History
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>, SourceError> {
        let (start, end) = range.bounds(&Local);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            read_history(&path, to_webkit_micros(start), to_webkit_micros(end))
        })
        .await
        .map_err(|err| SourceError::Task(err.to_string()))?
    }
}

/// Location of a profile's `History` file on this platform.
pub fn default_history_path(profile: &str) -> Option<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()?.join("Library/Application Support/Google/Chrome")
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()?.join("Google/Chrome/User Data")
    } else {
        dirs::config_dir()?.join("google-chrome")
    };
    Some(base.join(profile).join("History"))
}

pub(crate) fn to_webkit_micros(instant: DateTime<Utc>) -> i64 {
    (instant.timestamp() + WEBKIT_EPOCH_OFFSET_SECS) * 1_000_000
        + i64::from(instant.timestamp_subsec_micros())
}

pub(crate) const fn webkit_to_unix_secs(micros: i64) -> i64 {
    micros.div_euclid(1_000_000) - WEBKIT_EPOCH_OFFSET_SECS
}

/// Reads visits with `start_us <= visit_time < end_us` (WebKit microseconds).
pub fn read_history(path: &Path, start_us: i64, end_us: i64) -> Result<Vec<RawRecord>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound {
            what: "Chrome history",
            path: path.to_path_buf(),
        });
    }

    let direct = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .and_then(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        query_visits(&conn, start_us, end_us)
    });

    match direct {
        Ok(records) => Ok(records),
        Err(err) if is_locked(&err) => {
            tracing::debug!(path = %path.display(), "history database locked, reading a snapshot");
            read_snapshot(path, start_us, end_us)
        }
        Err(err) => Err(err.into()),
    }
}

fn read_snapshot(path: &Path, start_us: i64, end_us: i64) -> Result<Vec<RawRecord>, SourceError> {
    let dir = tempfile::tempdir()?;
    let copy = dir.path().join("History");
    std::fs::copy(path, &copy)?;

    let wal = sidecar(path, "-wal");
    if wal.exists() {
        std::fs::copy(&wal, sidecar(&copy, "-wal"))?;
    }

    let conn = Connection::open(&copy)?;
    Ok(query_visits(&conn, start_us, end_us)?)
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn query_visits(conn: &Connection, start_us: i64, end_us: i64) -> rusqlite::Result<Vec<RawRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT urls.url, urls.title, visits.visit_time
        FROM urls
        JOIN visits ON urls.id = visits.url
        WHERE visits.visit_time >= ?1 AND visits.visit_time < ?2
        ORDER BY visits.visit_time
        ",
    )?;
    let rows = stmt.query_map(params![start_us, end_us], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (url, title, visit_time) = row?;
        if title.as_deref().is_none_or(|t| t.trim().is_empty())
            || SKIPPED_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
        {
            continue;
        }
        records.push(RawRecord::History(HistoryRecord {
            url,
            title,
            visited_at: Some(webkit_to_unix_secs(visit_time)),
        }));
    }
    Ok(records)
}
