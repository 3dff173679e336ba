//! Directory watching
//!
//! Provides a [`DirectoryWatcher`] that wraps the `notify` crate to monitor a
//! single directory (non-recursively) and forwards creation events as
//! [`CreatedEntry`] values.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue / ReadDirectoryChangesW
//!       │
//!       ▼
//!  DirectoryWatcher  ──→  mpsc::channel  ──→  WatchService  ──→  Orchestrator
//! ```
//!
//! Only creations are forwarded. Modifications, renames and removals are
//! ignored.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::CreateKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the channel between the OS watcher thread and the service
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A new filesystem entry in the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntry {
    pub path: PathBuf,
    pub is_directory: bool,
}

/// Watches one directory using the OS-native mechanism
///
/// The `notify` callback runs on the watcher's own thread and uses
/// `blocking_send`, so the receiver must be drained from async code.
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, mut rx) = DirectoryWatcher::new()?;
/// watcher.watch(Path::new("/home/user/Inbox"))?;
/// while let Some(entry) = rx.recv().await { /* ... */ }
/// ```
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    watched: Option<PathBuf>,
}

impl DirectoryWatcher {
    /// Creates the OS watcher and the receiver its events arrive on
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<CreatedEntry>)> {
        let (tx, rx) = mpsc::channel::<CreatedEntry>(EVENT_CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for entry in map_notify_event(&event) {
                        if let Err(e) = tx.blocking_send(entry) {
                            warn!(error = %e, "Failed to forward creation event (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((
            Self {
                watcher,
                watched: None,
            },
            rx,
        ))
    }

    /// Starts watching `path` (non-recursively)
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (missing directory,
    /// insufficient permissions, or inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Watching directory");

        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))?;
        self.watched = Some(path.to_path_buf());
        Ok(())
    }

    /// Stops watching the current directory, if any
    pub fn unwatch(&mut self) -> Result<()> {
        if let Some(path) = self.watched.take() {
            info!(path = %path.display(), "Stopping watch");
            self.watcher
                .unwatch(&path)
                .with_context(|| format!("Failed to unwatch path: {}", path.display()))?;
        }
        Ok(())
    }

    pub fn watched(&self) -> Option<&Path> {
        self.watched.as_deref()
    }
}

/// Converts a `notify::Event` into creation entries
///
/// - `Create(File)` -> file entry
/// - `Create(Folder)` -> directory entry
/// - `Create(Any | Other)` -> kind decided by a `stat` of the path
/// - everything else -> nothing
fn map_notify_event(event: &notify::Event) -> Vec<CreatedEntry> {
    let EventKind::Create(kind) = event.kind else {
        return Vec::new();
    };

    event
        .paths
        .iter()
        .map(|path| {
            let is_directory = match kind {
                CreateKind::File => false,
                CreateKind::Folder => true,
                CreateKind::Any | CreateKind::Other => path.is_dir(),
            };
            debug!(path = %path.display(), is_directory, "Mapped Create event");
            CreatedEntry {
                path: path.clone(),
                is_directory,
            }
        })
        .collect()
}
