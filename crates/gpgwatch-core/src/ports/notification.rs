//! Notifier port (driven/secondary port)
//!
//! Per-file notices shown to the user: encrypted and moved, uploaded, upload
//! failed and kept locally, and so on. Logging is separate; notices are the
//! short user-facing lines the CLI prints.
//!
//! ## Design Notes
//!
//! - Notices are fire-and-forget and `notify` is synchronous; implementations
//!   must not fail the pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Failure,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// A user-visible message about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// File the notice is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Failure, message)
    }
}

/// Receives user-visible notices
pub trait INotifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Notifier that drops every notice
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl INotifier for NullNotifier {
    fn notify(&self, _notice: &Notice) {}
}
