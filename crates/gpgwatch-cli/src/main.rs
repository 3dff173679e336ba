//! gpgwatch CLI - Command-line interface for gpgwatch
//!
//! Provides commands for:
//! - Watching a directory and encrypting new files (`run`)
//! - Checking configuration and the GPG recipient without watching (`check`)
//! - Inspecting the configuration file (`config`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gpgwatch_core::config::{expand_tilde, Config};

mod commands;
mod logging;
mod output;

use commands::{check::CheckCommand, config::ConfigCommand, run::RunCommand, Globals};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "gpgwatch",
    version,
    about = "Encrypt new files with GnuPG and deliver them to a folder, Google Drive or Dropbox"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the configured directory until interrupted
    Run(RunCommand),
    /// Validate configuration and look up the GPG key
    Check(CheckCommand),
    /// View the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let globals = Globals {
        config_path: cli
            .config
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(Config::default_path),
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        verbose: cli.verbose,
    };

    match cli.command {
        // `run` sets up logging itself once the config is loaded
        Commands::Run(cmd) => cmd.execute(&globals).await,
        Commands::Check(cmd) => {
            logging::init_console(globals.verbose)?;
            cmd.execute(&globals).await
        }
        Commands::Config(cmd) => {
            logging::init_console(globals.verbose)?;
            cmd.execute(&globals).await
        }
    }
}
