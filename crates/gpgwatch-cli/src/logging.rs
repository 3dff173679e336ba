//! Tracing subscriber setup
//!
//! Console output goes through an `EnvFilter`: `RUST_LOG` wins, then
//! `--debug`, then `-v`, then the configured level. A configured log file
//! receives everything at DEBUG without ANSI colors.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use gpgwatch_core::config::LoggingConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Console level for commands that run without a loaded config
pub fn init_console(verbose: u8) -> Result<()> {
    let level = verbosity_level(verbose).unwrap_or("warn");
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(env_filter(level)))
        .try_init()
        .context("Failed to initialize logging")
}

/// Console plus optional file logging for `run`
pub fn init(config: &LoggingConfig, verbose: u8, debug: bool) -> Result<()> {
    let level = console_level(config, verbose, debug);

    let file_layer = match config.file.as_deref() {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(env_filter(level)))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

fn console_level(config: &LoggingConfig, verbose: u8, debug: bool) -> &'static str {
    if debug && verbose < 2 {
        return "debug";
    }
    verbosity_level(verbose)
        .or_else(|| config.normalized_level())
        .unwrap_or("info")
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            file: None,
        }
    }

    #[test]
    fn configured_level_used_by_default() {
        assert_eq!(console_level(&config("WARNING"), 0, false), "warn");
        assert_eq!(console_level(&config("critical"), 0, false), "error");
    }

    #[test]
    fn debug_flag_overrides_config() {
        assert_eq!(console_level(&config("error"), 0, true), "debug");
    }

    #[test]
    fn verbosity_overrides_config() {
        assert_eq!(console_level(&config("error"), 1, false), "debug");
        assert_eq!(console_level(&config("error"), 3, true), "trace");
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(console_level(&config("loud"), 0, false), "info");
    }

    #[test]
    fn log_file_parent_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/gpgwatch.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
