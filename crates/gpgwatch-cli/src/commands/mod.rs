//! Subcommands of the `gpgwatch` binary

pub mod check;
pub mod config;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use gpgwatch_core::config::Config;

use crate::output::OutputFormat;

/// Options shared by every subcommand
#[derive(Debug, Clone)]
pub struct Globals {
    pub config_path: PathBuf,
    pub format: OutputFormat,
    pub verbose: u8,
}

impl Globals {
    /// Loads the configuration file, failing if it is missing or malformed
    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }
}
