//! Run command - Watch the configured directory until interrupted
//!
//! Provides the `gpgwatch run` CLI command which:
//! 1. Loads and validates the configuration, applying `--google-drive` / `--dropbox`
//! 2. Resolves the GPG recipient to exactly one key
//! 3. Authenticates the cloud backend and verifies the remote folder
//! 4. Watches until SIGINT/SIGTERM, then drains in-flight files

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use gpgwatch_cloud::uploader_for;
use gpgwatch_core::config::Config;
use gpgwatch_core::domain::{CloudBackend, Destination};
use gpgwatch_core::ports::{ICloudUploader, IEncryptionEngine};
use gpgwatch_crypto::{describe_key, verify_recipient, GpgEngine};
use gpgwatch_pipeline::{
    shutdown_signal, DestinationRouter, Encryptor, ExtensionFilter, Orchestrator, SettleWaiter,
    WatchService,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Globals;
use crate::logging;
use crate::output::{get_formatter, ConsoleNotifier, OutputFormat};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Upload encrypted files to Google Drive
    #[arg(long, conflicts_with = "dropbox")]
    pub google_drive: bool,

    /// Upload encrypted files to Dropbox
    #[arg(long)]
    pub dropbox: bool,

    /// Log at debug level
    #[arg(long)]
    pub debug: bool,
}

impl RunCommand {
    /// Backend chosen on the command line, if any
    pub fn backend_override(&self) -> Option<CloudBackend> {
        if self.google_drive {
            Some(CloudBackend::GoogleDrive)
        } else if self.dropbox {
            Some(CloudBackend::Dropbox)
        } else {
            None
        }
    }

    pub async fn execute(&self, globals: &Globals) -> Result<()> {
        let mut config = globals.load_config()?;
        if let Some(backend) = self.backend_override() {
            config.select_backend(backend);
        }
        logging::init(&config.logging, globals.verbose, self.debug)?;

        let formatter = get_formatter(globals.format);
        let destination = config.validated_destination()?;
        info!(
            config = %globals.config_path.display(),
            watch = %config.watch.directory.display(),
            destination = %destination,
            "Starting gpgwatch"
        );

        let engine: Arc<dyn IEncryptionEngine> = Arc::new(GpgEngine::from_config(&config.gpg));
        let key = verify_recipient(engine.as_ref(), &config.gpg.key_id).await?;
        formatter.success(&format!("Using GPG key {}", describe_key(&key)));

        let uploader = match destination.backend() {
            Some(backend) => Some(connect(backend, &config, &destination, globals.format).await?),
            None => None,
        };
        let router = DestinationRouter::for_destination(&destination, uploader)?;

        let orchestrator = Orchestrator::new(Encryptor::new(engine, config.gpg.key_id.clone()), router)
            .with_filter(ExtensionFilter::new(config.watch.file_extensions.clone()))
            .with_settle(SettleWaiter::from_millis(config.watch.settle_delay_ms))
            .with_notifier(Arc::new(ConsoleNotifier::new(globals.format)))
            .delete_original(config.watch.delete_original);

        let shutdown = CancellationToken::new();
        tokio::spawn(shutdown_signal(shutdown.clone()));

        formatter.success(&format!(
            "Watching {} -> {}",
            config.watch.directory.display(),
            orchestrator.router().describe()
        ));
        if let Some(extensions) = &config.watch.file_extensions {
            formatter.info(&format!("File types: {}", extensions.join(", ")));
        }
        formatter.info("Press Ctrl+C to stop");

        let service = WatchService::new(Arc::new(orchestrator), &config.watch.directory, shutdown);
        let summary = service.run().await?;

        if matches!(globals.format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "accepted": summary.accepted,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "vanished": summary.vanished,
                "skipped": summary.skipped,
            }));
        } else {
            formatter.success(&format!(
                "Stopped: {} encrypted, {} failed",
                summary.succeeded, summary.failed
            ));
        }
        Ok(())
    }
}

/// Builds, authenticates and checks the uploader for `backend`
async fn connect(
    backend: CloudBackend,
    config: &Config,
    destination: &Destination,
    format: OutputFormat,
) -> Result<Arc<dyn ICloudUploader>> {
    let formatter = get_formatter(format);
    let uploader = uploader_for(backend, config)?;

    let account = uploader
        .authenticate()
        .await
        .with_context(|| format!("{backend} authentication failed"))?;
    formatter.success(&format!("Connected to {backend} as {account}"));

    let folder = destination
        .folder_ref()
        .with_context(|| format!("destination {destination} has no remote folder"))?;
    let usable = uploader
        .verify_or_create_folder(&folder)
        .await
        .with_context(|| format!("Failed to verify {backend} folder {folder}"))?;
    if !usable {
        bail!("{backend} folder {folder} is not usable as an upload target");
    }
    Ok(uploader)
}
