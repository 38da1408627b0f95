//! apphash-relay CLI entry point.
//!
//! Provides `start` to run the watchdog daemon, `replay` to run both
//! pipelines once over a JSONL log export, `filters` to print the
//! subscription queries, and `extract` to test commit-line parsing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use apphash_relay::config::{
    load_relay_config, ConfigError, RelayConfig, Settings, SourceKind, NETWORK_VAR,
};
use apphash_relay::extractor;
use apphash_relay::ingest::http::HttpTailSource;
use apphash_relay::ingest::tail::TailSource;
use apphash_relay::ingest::LogSource;
use apphash_relay::logging::{self, LoggingGuard};
use apphash_relay::notifier::{DiscordNotifier, LogNotifier, Notifier};
use apphash_relay::supervisor::{Supervisor, SupervisorError};

/// Exit status for missing or invalid configuration.
const EXIT_CONFIG: u8 = 1;
/// Exit status after a fatal root divergence.
const EXIT_DIVERGENCE: u8 = 2;

/// apphash-relay: alerts when validators disagree on the app hash.
#[derive(Parser)]
#[command(name = "apphash-relay", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the watchdog daemon.
    Start {
        /// TOML tunables file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Load environment variables from this file first.
        #[arg(long)]
        env_file: Option<PathBuf>,
        /// Log notifications instead of posting them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run both pipelines once over a JSONL log export.
    Replay {
        /// Export file (one log entry per line).
        file: PathBuf,
        /// TOML tunables file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Network name; defaults to `PENUMBRA_NETWORK`.
        #[arg(long)]
        network: Option<String>,
    },
    /// Print the subscription filters for both pipelines.
    Filters {
        /// TOML tunables file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Network name; defaults to `PENUMBRA_NETWORK`.
        #[arg(long)]
        network: Option<String>,
    },
    /// Read log lines from stdin and print every extracted commit.
    Extract,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Start {
            config,
            env_file,
            dry_run,
        } => handle_start(config.as_deref(), env_file.as_deref(), dry_run).await,
        Command::Replay {
            file,
            config,
            network,
        } => handle_replay(file, config.as_deref(), network).await,
        Command::Filters { config, network } => handle_filters(config.as_deref(), network),
        Command::Extract => handle_extract(),
    }
}

/// Run the daemon until the sources end or the fleet diverges.
async fn handle_start(config_path: Option<&Path>, env_file: Option<&Path>, dry_run: bool) -> ExitCode {
    if let Some(path) = env_file {
        if let Err(e) = dotenvy::from_path(path) {
            println!("failed to load env file {}: {e}", path.display());
            return ExitCode::from(EXIT_CONFIG);
        }
    } else {
        let _ = dotenvy::dotenv();
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => return config_failure(&e),
    };
    let config = match load_validated(config_path) {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };

    let _logging_guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => return config_failure(&e),
    };

    info!(network = %settings.network, project = %settings.project_id, dry_run, "apphash relay starting up");

    let notifier: Arc<dyn Notifier> = if dry_run {
        Arc::new(LogNotifier)
    } else {
        match DiscordNotifier::new(
            settings.webhook_url.clone(),
            config.notifier.timeout(),
            config.notifier.max_message_len,
        ) {
            Ok(n) => Arc::new(n),
            Err(e) => return config_failure(&e),
        }
    };

    let (commit_source, error_source) = match (
        build_source(&config, &settings, "commits"),
        build_source(&config, &settings, "errors"),
    ) {
        (Ok(commits), Ok(errors)) => (commits, errors),
        (Err(e), _) | (_, Err(e)) => return config_failure(&e),
    };

    let supervisor = Supervisor::new(config, &settings.network, notifier);
    exit_for(supervisor.run(commit_source, error_source).await)
}

/// Run both pipelines over a finished export and exit.
async fn handle_replay(file: PathBuf, config_path: Option<&Path>, network: Option<String>) -> ExitCode {
    let Some(network) = network.or_else(|| std::env::var(NETWORK_VAR).ok()) else {
        return config_failure(&ConfigError::MissingVar(NETWORK_VAR));
    };

    let mut config = match load_relay_config(config_path) {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };
    config.source.kind = SourceKind::File;
    config.source.path = Some(file.clone());
    config.health.port = 0;
    if let Err(e) = config.validate() {
        return config_failure(&e);
    }

    logging::init_console(&config.logging.level);
    info!(file = %file.display(), network = %network, "replaying log export");

    let poll = config.source.poll_interval();
    let commit_source = Box::new(TailSource::new("commits", file.clone(), poll, false));
    let error_source = Box::new(TailSource::new("errors", file, poll, false));

    let supervisor = Supervisor::new(config, &network, Arc::new(LogNotifier));
    exit_for(supervisor.run(commit_source, error_source).await)
}

/// Print both subscription queries.
fn handle_filters(config_path: Option<&Path>, network: Option<String>) -> ExitCode {
    let Some(network) = network.or_else(|| std::env::var(NETWORK_VAR).ok()) else {
        return config_failure(&ConfigError::MissingVar(NETWORK_VAR));
    };
    let config = match load_relay_config(config_path) {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };

    let supervisor = Supervisor::new(config, &network, Arc::new(LogNotifier));
    println!("commits: {}", supervisor.commit_filter());
    println!("errors:  {}", supervisor.error_filter());
    ExitCode::SUCCESS
}

/// Extract commit events from stdin, one JSON object per match.
fn handle_extract() -> ExitCode {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if let Ok(event) = extractor::extract("stdin", &line) {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("failed to encode event: {e}"),
            }
        }
    }
    ExitCode::SUCCESS
}

fn load_validated(path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let config = load_relay_config(path)?;
    config.validate().context("invalid relay config")?;
    Ok(config)
}

fn init_logging(config: &RelayConfig) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.logging.dir {
        Some(dir) => logging::init_production(dir, &config.logging.level).map(Some),
        None => {
            logging::init_console(&config.logging.level);
            Ok(None)
        }
    }
}

fn build_source(
    config: &RelayConfig,
    settings: &Settings,
    name: &str,
) -> anyhow::Result<Box<dyn LogSource>> {
    match config.source.kind {
        SourceKind::Http => {
            let endpoint = config
                .source
                .endpoint
                .clone()
                .context("source.endpoint is not set")?;
            Ok(Box::new(HttpTailSource::new(
                name,
                endpoint,
                &settings.project_id,
                settings.credentials.expose(),
            )))
        }
        SourceKind::File => {
            let path = config.source.path.clone().context("source.path is not set")?;
            Ok(Box::new(TailSource::new(
                name,
                path,
                config.source.poll_interval(),
                true,
            )))
        }
    }
}

fn config_failure(e: &dyn std::fmt::Display) -> ExitCode {
    println!("{e:#}");
    ExitCode::from(EXIT_CONFIG)
}

fn exit_for(result: Result<(), SupervisorError>) -> ExitCode {
    match result {
        Ok(()) => {
            info!("exiting");
            ExitCode::SUCCESS
        }
        Err(SupervisorError::Divergence(divergence)) => {
            error!(height = divergence.height, "halting on root divergence");
            ExitCode::from(EXIT_DIVERGENCE)
        }
        Err(e) => {
            error!(error = %e, "supervisor failed");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}
