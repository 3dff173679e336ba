//! Config command - View and check the gpgwatch configuration
//!
//! Provides the `gpgwatch config` CLI command which:
//! 1. Shows the loaded configuration (YAML or JSON) with secrets redacted
//! 2. Validates the configuration file and reports every error
//! 3. Prints the configuration file path in use

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use gpgwatch_core::config::Config;
use tracing::info;

use super::Globals;
use crate::output::{get_formatter, OutputFormat};

const REDACTED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, globals: &Globals) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(globals),
            ConfigCommand::Validate => execute_validate(globals),
            ConfigCommand::Path => execute_path(globals),
        }
    }
}

fn execute_show(globals: &Globals) -> Result<()> {
    let formatter = get_formatter(globals.format);
    let config = redacted(globals.load_config()?);

    info!(config_path = %globals.config_path.display(), "Showing configuration");

    if matches!(globals.format, OutputFormat::Json) {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", globals.config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(globals: &Globals) -> Result<()> {
    let formatter = get_formatter(globals.format);
    let config_path = &globals.config_path;

    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if matches!(globals.format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [e.to_string()],
                }));
            } else {
                formatter.error(&e.to_string());
            }
            bail!("Configuration could not be loaded");
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let mut problems: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
    let destination = match config.destination() {
        Ok(destination) => Some(destination),
        Err(e) => {
            problems.push(e.to_string());
            None
        }
    };

    if matches!(globals.format, OutputFormat::Json) {
        formatter.print_json(&serde_json::json!({
            "valid": problems.is_empty(),
            "config_path": config_path.display().to_string(),
            "destination": destination.as_ref().map(|d| d.to_string()),
            "errors": problems,
        }));
    } else if problems.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
        if let Some(destination) = &destination {
            formatter.info(&format!("Destination: {destination}"));
        }
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            problems.len(),
            if problems.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for problem in &problems {
            formatter.info(&format!("  {problem}"));
        }
    }

    if !problems.is_empty() {
        bail!("Configuration is invalid");
    }
    Ok(())
}

fn execute_path(globals: &Globals) -> Result<()> {
    let formatter = get_formatter(globals.format);
    let exists = globals.config_path.exists();

    if matches!(globals.format, OutputFormat::Json) {
        formatter.print_json(&serde_json::json!({
            "config_path": globals.config_path.display().to_string(),
            "exists": exists,
        }));
    } else {
        println!("{}", globals.config_path.display());
        if !exists {
            formatter.warn("file does not exist");
        }
    }
    Ok(())
}

/// Hides credentials before the config is printed
fn redacted(mut config: Config) -> Config {
    if config.dropbox.access_token.is_some() {
        config.dropbox.access_token = Some(REDACTED.to_string());
    }
    config
}
