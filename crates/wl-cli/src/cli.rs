//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Daily work summary.
///
/// Pulls calendar events, browser history, commits, Slack messages and
/// Linear issues into one chronological report.
#[derive(Debug, Parser)]
#[command(name = "worklog", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Date to summarize (YYYY-MM-DD, DD/MM/YYYY or MM/DD/YYYY).
    #[arg(short, long, conflicts_with = "yesterday")]
    pub date: Option<String>,

    /// Summarize yesterday.
    #[arg(short, long)]
    pub yesterday: bool,

    /// Print the report as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Add an AI-written summary to the report.
    #[arg(long, global = true)]
    pub summarize: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize one day (default: today).
    Day {
        /// Date (YYYY-MM-DD, DD/MM/YYYY or MM/DD/YYYY).
        date: Option<String>,
    },

    /// Summarize a week, Monday to Sunday (default: this week).
    Week {
        /// Week number (e.g. 3) or ISO week (e.g. 2025-W03).
        week: Option<String>,
    },

    /// Summarize a calendar month (default: this month).
    Month {
        /// Month name, number, or YYYY-MM.
        month: Option<String>,
    },

    /// Ask questions about your work in a conversation.
    Chat {
        /// Ask a single question and exit.
        #[arg(short, long)]
        query: Option<String>,

        /// Claude model to use.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Configure credentials interactively.
    Setup,

    /// Show which sources are configured.
    Status,
}
