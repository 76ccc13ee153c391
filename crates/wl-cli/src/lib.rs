//! Worklog CLI library.
//!
//! This crate provides the command-line interface: argument parsing,
//! configuration, and the report, chat, setup and status commands.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, default_config_file, dirs_config_path};
