//! Strand DNS Server
//!
//! Serves DNS over HTTPS alongside a management API and UI, with a fixed
//! pool of reusable connection handlers per listener.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_config::Config;
use strand_core::RunState;
use strand_server::{LoopbackResolver, NotFoundHandler, Server};
use tracing::{info, warn, Level};

/// Strand DNS Server - DNS over HTTPS with a management API
#[derive(Parser, Debug)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server (default)
    Run,

    /// Validate the configuration file
    Validate,

    /// Show version information
    Version,
}

/// Find the configuration file in standard locations
fn find_config_file(explicit_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path);
    }

    let search_paths = [
        PathBuf::from("./strand.yaml"),
        PathBuf::from("./strand.yml"),
        PathBuf::from("./config.yaml"),
        PathBuf::from("/etc/strand/config.yaml"),
        PathBuf::from("/etc/strand/strand.yaml"),
    ];

    search_paths.into_iter().find(|path| path.exists())
}

/// Parse log level from string
fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the tracing subsystem
fn init_logging(config: &Config, cli_level: Option<&str>) {
    let level = parse_log_level(cli_level.unwrap_or(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }
}

fn load_config(explicit_path: Option<PathBuf>) -> Result<Config> {
    let Some(path) = find_config_file(explicit_path) else {
        bail!("no configuration file found; pass one with --config");
    };
    let config = Config::from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(config_path: Option<PathBuf>, log_level: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config, log_level);

    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    info!(name = %config.server.name, version = %config.server.version, "starting");

    let server = Arc::new(Server::new(
        config,
        Arc::new(LoopbackResolver),
        Arc::new(NotFoundHandler),
        Arc::new(NotFoundHandler),
    ));

    // First Ctrl-C drains, the second stops.
    let run_flag = server.run_flag();
    let signals = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        let count = signals.fetch_add(1, Ordering::SeqCst);
        if count == 0 {
            warn!("shutdown requested, draining; press again to stop now");
            let _ = run_flag.set(RunState::Draining);
        } else {
            let _ = run_flag.set(RunState::Shutdown);
        }
    })
    .context("failed to install signal handler")?;

    server.run()?;
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("configuration OK ({} listeners)", listener_count(&config));
    Ok(())
}

fn listener_count(config: &Config) -> usize {
    [config.doh.is_some(), config.api.is_some(), config.ui.is_some()]
        .iter()
        .filter(|present| **present)
        .count()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cli.config, cli.log_level.as_deref()),
        Commands::Validate => validate(cli.config),
        Commands::Version => {
            println!("strand {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
