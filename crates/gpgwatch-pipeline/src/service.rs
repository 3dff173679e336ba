//! Watch loop: one spawned pipeline per accepted creation event
//!
//! The service owns the [`DirectoryWatcher`] and feeds its events to the
//! [`Orchestrator`]. Cancelling the token stops intake and closes the
//! watcher; [`WatchService::run`] then waits for every in-flight pipeline
//! to reach a terminal state before returning.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use gpgwatch_core::domain::PipelineOutcome;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;
use crate::watcher::{CreatedEntry, DirectoryWatcher};

/// Counters for one service run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub accepted: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub vanished: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    vanished: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WatchSummary {
        WatchSummary {
            accepted: self.accepted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            vanished: self.vanished.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: Option<&PipelineOutcome>) {
        let counter = match outcome {
            Some(PipelineOutcome::Vanished) => &self.vanished,
            Some(outcome) if outcome.is_success() => &self.succeeded,
            _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct WatchService {
    orchestrator: Arc<Orchestrator>,
    directory: PathBuf,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl WatchService {
    pub fn new(orchestrator: Arc<Orchestrator>, directory: impl Into<PathBuf>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            directory: directory.into(),
            shutdown,
            tracker: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Pipelines currently running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Watches until the shutdown token fires, then drains in-flight work
    pub async fn run(self) -> Result<WatchSummary> {
        let (mut watcher, rx) = DirectoryWatcher::new()?;
        watcher.watch(&self.directory)?;
        info!(directory = %self.directory.display(), "Watching for new files");

        self.consume(rx).await;

        if let Err(e) = watcher.unwatch() {
            warn!(error = %e, "Failed to stop watcher cleanly");
        }
        drop(watcher);

        self.drain().await
    }

    /// Dispatches entries from `rx` until shutdown or until the channel closes
    pub async fn consume(&self, mut rx: mpsc::Receiver<CreatedEntry>) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting files");
                    break;
                }
                entry = rx.recv() => match entry {
                    Some(entry) => {
                        self.dispatch(entry);
                    }
                    None => {
                        warn!("Watcher channel closed");
                        break;
                    }
                },
            }
        }
    }

    /// Admits `entry` and spawns its pipeline; returns false when skipped
    pub fn dispatch(&self, entry: CreatedEntry) -> bool {
        let ticket = match self.orchestrator.admit(&entry) {
            Ok(ticket) => ticket,
            Err(reason) => {
                debug!(path = %entry.path.display(), %reason, "Skipped");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        let orchestrator = Arc::clone(&self.orchestrator);
        let counters = Arc::clone(&self.counters);
        self.tracker.spawn(async move {
            let report = orchestrator.run(ticket).await;
            counters.record(report.outcome());
            debug!(
                path = %report.path().display(),
                state = %report.state(),
                outcome = ?report.outcome(),
                "Pipeline finished"
            );
        });
        true
    }

    /// Waits for every spawned pipeline, then reports the counters
    pub async fn drain(&self) -> Result<WatchSummary> {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight files to finish");
        }
        self.tracker.wait().await;

        let summary = self.counters.snapshot();
        info!(
            accepted = summary.accepted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            vanished = summary.vanished,
            skipped = summary.skipped,
            "Watcher stopped"
        );
        Ok(summary)
    }
}

/// Waits for SIGINT or SIGTERM and cancels `token`
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
        _ = token.cancelled() => {
            return;
        }
    }

    token.cancel();
}
