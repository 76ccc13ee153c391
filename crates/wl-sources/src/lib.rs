//! Activity source clients for worklog.
//!
//! Each client fetches raw records for a [`DateRange`](wl_core::DateRange)
//! from one system:
//! - Google Calendar (`calendar`), authenticated through a [`TokenProvider`]
//! - Chrome browser history (`chrome`), read from the local SQLite file
//! - GitHub commits (`github`)
//! - Slack messages (`slack`)
//! - Linear issues (`linear`)
//!
//! [`collect`] runs a set of clients concurrently and hands their records to
//! the normalizer and aggregator in `wl-core`.

pub mod calendar;
pub mod chrome;
mod client;
mod collect;
mod error;
pub mod github;
pub mod linear;
mod settings;
pub mod slack;
pub mod token;

pub use calendar::CalendarClient;
pub use chrome::ChromeClient;
pub use client::SourceClient;
pub use collect::collect;
pub use error::{ConfigurationError, SourceError};
pub use github::GitHubClient;
pub use linear::{LinearClient, WorkspaceQuery};
pub use settings::{ConfiguredSource, SourceSettings};
pub use slack::SlackClient;
pub use token::{StaticToken, StoredToken, TokenProvider};
