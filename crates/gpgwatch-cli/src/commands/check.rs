//! Check command - Validate configuration and the GPG recipient
//!
//! Runs the startup checks of `gpgwatch run` that need no network access and
//! exits without watching.

use anyhow::{bail, Result};
use clap::Args;
use gpgwatch_core::config::ConfigError;
use gpgwatch_core::ports::IEncryptionEngine;
use gpgwatch_crypto::{describe_key, verify_recipient, GpgEngine};
use tracing::info;

use super::Globals;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn execute(&self, globals: &Globals) -> Result<()> {
        let formatter = get_formatter(globals.format);
        let config = globals.load_config()?;
        info!(config_path = %globals.config_path.display(), "Checking configuration");

        let errors = config.validate();
        if !errors.is_empty() {
            if matches!(globals.format, OutputFormat::Json) {
                let fields: Vec<_> = errors
                    .iter()
                    .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                    .collect();
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "config_path": globals.config_path.display().to_string(),
                    "errors": fields,
                }));
            } else {
                for error in &errors {
                    formatter.error(&error.to_string());
                }
            }
            return Err(ConfigError::Invalid(errors).into());
        }

        let destination = config.destination()?;
        let engine = GpgEngine::from_config(&config.gpg);
        let key = match verify_recipient(&engine as &dyn IEncryptionEngine, &config.gpg.key_id).await {
            Ok(key) => key,
            Err(e) => {
                formatter.error(&format!("{e:#}"));
                bail!("GPG key check failed");
            }
        };

        if matches!(globals.format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "config_path": globals.config_path.display().to_string(),
                "watch_directory": config.watch.directory.display().to_string(),
                "destination": destination.to_string(),
                "key": key,
            }));
        } else {
            formatter.success(&format!("Configuration OK ({})", globals.config_path.display()));
            formatter.info(&format!("Watch directory: {}", config.watch.directory.display()));
            formatter.info(&format!("Destination:     {destination}"));
            formatter.success(&format!("GPG key: {}", describe_key(&key)));
        }
        Ok(())
    }
}
