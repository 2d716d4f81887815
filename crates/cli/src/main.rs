//! canary CLI - Main Entry Point
//!
//! Runs the canary test corpus by scope, gates start-up on the self-test,
//! and inspects the test setup of the current host.

use anyhow::Context;
use canary_common::config::DEFAULT_CONFIG_FILE;
use canary_common::{logging, CanaryConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{config, discover, info, self_test, test};

/// canary - test orchestration for the canCANary CAN bus simulator
#[derive(Parser)]
#[command(name = "canary")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "CANARY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests for a scope
    Test(test::TestArgs),

    /// Run the pipeline self-test
    SelfTest(self_test::SelfTestArgs),

    /// Show what a run would target
    Discover(discover::DiscoverArgs),

    /// Show platform and tool information
    Info,

    /// Show or create the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    // `config init` must work even when the existing file does not parse
    if let Commands::Config(config::ConfigCommands::Init { force }) = cli.command {
        return config::init(&config_path, force);
    }

    let config = CanaryConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let guard = logging::init(&config.logging, cli.verbose)
        .context("Failed to initialize logging")?;
    tracing::debug!("Using configuration {}", config_path.display());

    let code = match cli.command {
        Commands::Test(args) => test::execute(args, &config, cli.verbose, cli.format).await?,
        Commands::SelfTest(args) => self_test::execute(args, &config, cli.format).await?,
        Commands::Discover(args) => discover::execute(args, &config, cli.format)?,
        Commands::Info => info::execute(&config, cli.format)?,
        Commands::Config(cmd) => config::execute(cmd, &config, &config_path, cli.format)?,
    };

    // Flush log writers before a non-zero exit skips destructors
    drop(guard);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
