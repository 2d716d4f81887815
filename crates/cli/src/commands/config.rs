//! Config Commands

use anyhow::{bail, Context, Result};
use canary_common::CanaryConfig;
use clap::Subcommand;
use std::path::Path;

use crate::output::{print_success, serialize, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(
    cmd: ConfigCommands,
    config: &CanaryConfig,
    path: &Path,
    format: OutputFormat,
) -> Result<i32> {
    match cmd {
        ConfigCommands::Show => {
            let rendered = match format {
                OutputFormat::Json | OutputFormat::Yaml => serialize(config, format)?,
                _ => toml::to_string_pretty(config).context("Failed to render configuration")?,
            };
            println!("{}", rendered);
            Ok(0)
        }
        ConfigCommands::Init { force } => {
            init(path, force)?;
            Ok(0)
        }
    }
}

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    CanaryConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}
