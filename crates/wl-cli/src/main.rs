use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wl_cli::commands::{chat, report, setup, status};
use wl_cli::{Cli, Commands, Config, default_config_file};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let config = load_config(config_path)?;
    let today = Local::now().date_naive();
    let options = report::ReportOptions {
        json: cli.json,
        summarize: cli.summarize,
    };

    let range = match &cli.command {
        Some(Commands::Setup) => {
            let path = config_path
                .map(Path::to_path_buf)
                .or_else(default_config_file)
                .context("cannot determine a config directory; pass --config")?;
            // Environment overrides are not written back
            let existing = Config::load_file(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return setup::run(&existing, &path);
        }
        Some(Commands::Status) => {
            return status::run(&mut std::io::stdout(), &config, config_path);
        }
        Some(Commands::Chat { query, model }) => {
            return chat::run(&runtime()?, &config, query.as_deref(), model.as_deref());
        }
        Some(Commands::Day { date }) => report::day_range(date.as_deref(), today)?,
        Some(Commands::Week { week }) => report::week_range(week.as_deref(), today)?,
        Some(Commands::Month { month }) => report::month_range(month.as_deref(), today)?,
        None if cli.yesterday => report::yesterday_range(today),
        None => report::day_range(cli.date.as_deref(), today)?,
    };

    let mut stdout = std::io::stdout();
    runtime()?.block_on(report::run(&mut stdout, &config, range, options))
}
