//! Per-file pipeline: admit, settle, encrypt, route, clean up
//!
//! ```text
//! CreatedEntry ─→ admit() ─→ GuardTicket ─→ run() ─→ PipelineReport
//!                   │
//!                   └─→ SkipReason (directory, artifact, filtered, busy)
//! ```
//!
//! `admit` is synchronous so the watch loop can drop duplicate
//! notifications before spawning anything. `run` never fails: every error
//! is folded into the report's outcome and surfaced through the notifier.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use gpgwatch_core::domain::{
    EncryptedArtifact, PipelineOutcome, PipelineReport, PipelineState, WatchedEntry,
};
use gpgwatch_core::ports::{INotifier, Notice, NullNotifier};
use tracing::{debug, error, info, warn};

use crate::encryptor::Encryptor;
use crate::filter::{is_artifact, ExtensionFilter};
use crate::guard::{GuardTicket, ProcessingGuard};
use crate::router::{DestinationRouter, RouteResult};
use crate::settle::{SettleWaiter, Settled};
use crate::watcher::CreatedEntry;

/// Why a notification did not start a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Directory,
    /// A `.gpg` file, most likely one this process just wrote
    Artifact,
    FilteredOut,
    AlreadyProcessing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Directory => "directory",
            SkipReason::Artifact => "encrypted artifact",
            SkipReason::FilteredOut => "unmatched extension",
            SkipReason::AlreadyProcessing => "already processing",
        };
        f.write_str(text)
    }
}

#[derive(Debug)]
pub enum Dispatch {
    Skipped(SkipReason),
    Ran(PipelineReport),
}

pub struct Orchestrator {
    filter: ExtensionFilter,
    guard: ProcessingGuard,
    settle: SettleWaiter,
    encryptor: Encryptor,
    router: DestinationRouter,
    notifier: Arc<dyn INotifier>,
    delete_original: bool,
}

impl Orchestrator {
    /// Defaults: no extension filter, 500 ms settle, keep originals, no notices
    pub fn new(encryptor: Encryptor, router: DestinationRouter) -> Self {
        Self {
            filter: ExtensionFilter::allow_all(),
            guard: ProcessingGuard::new(),
            settle: SettleWaiter::default(),
            encryptor,
            router,
            notifier: Arc::new(NullNotifier),
            delete_original: false,
        }
    }

    pub fn with_filter(mut self, filter: ExtensionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_guard(mut self, guard: ProcessingGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_settle(mut self, settle: SettleWaiter) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn INotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn delete_original(mut self, delete: bool) -> Self {
        self.delete_original = delete;
        self
    }

    pub fn guard(&self) -> &ProcessingGuard {
        &self.guard
    }

    pub fn router(&self) -> &DestinationRouter {
        &self.router
    }

    /// Decides whether `entry` starts a pipeline and, if so, claims its path
    pub fn admit(&self, entry: &CreatedEntry) -> Result<GuardTicket, SkipReason> {
        if entry.is_directory {
            return Err(SkipReason::Directory);
        }
        if is_artifact(&entry.path) {
            debug!(path = %entry.path.display(), "Ignoring encrypted artifact");
            return Err(SkipReason::Artifact);
        }
        if !self.filter.keeps(&WatchedEntry::new(&entry.path)) {
            debug!(path = %entry.path.display(), "Ignoring file with unmatched extension");
            return Err(SkipReason::FilteredOut);
        }
        match self.guard.acquire(&entry.path) {
            Some(ticket) => {
                info!(path = %entry.path.display(), "New file detected");
                Ok(ticket)
            }
            None => {
                debug!(path = %entry.path.display(), "Already processing, dropping notification");
                Err(SkipReason::AlreadyProcessing)
            }
        }
    }

    /// `admit` followed by `run`
    pub async fn handle(&self, entry: CreatedEntry) -> Dispatch {
        match self.admit(&entry) {
            Ok(ticket) => Dispatch::Ran(self.run(ticket).await),
            Err(reason) => Dispatch::Skipped(reason),
        }
    }

    /// Runs the pipeline for the ticket's path; the ticket is released when
    /// this returns
    pub async fn run(&self, ticket: GuardTicket) -> PipelineReport {
        let path = ticket.path().to_path_buf();
        let mut report = PipelineReport::new(&path);
        advance(&mut report, PipelineState::Guarded);

        advance(&mut report, PipelineState::Settling);
        if self.settle.wait(&path).await == Settled::Vanished {
            advance(&mut report, PipelineState::AbortedVanished);
            report.set_outcome(PipelineOutcome::Vanished);
            return report;
        }

        advance(&mut report, PipelineState::Encrypting);
        let artifact = match self.encryptor.encrypt(&path).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to encrypt file");
                self.notifier.notify(
                    &Notice::failure(format!("Failed to process: {}\nError: {}", display_name(&path), e))
                        .with_path(&path),
                );
                advance(&mut report, PipelineState::FailedEncrypt);
                report.set_outcome(PipelineOutcome::EncryptionFailed {
                    reason: e.to_string(),
                });
                return report;
            }
        };

        advance(&mut report, PipelineState::Routing);
        let outcome = self.route(&artifact).await;
        let state = match &outcome {
            PipelineOutcome::Moved { .. } => PipelineState::LocalMoved,
            PipelineOutcome::Uploaded { .. } => PipelineState::Uploaded,
            PipelineOutcome::UploadFailedKept { .. } => PipelineState::UploadFailedKept,
            _ => PipelineState::MoveFailed,
        };
        advance(&mut report, state);

        advance(&mut report, PipelineState::SourceCleanup);
        if self.delete_original {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Deleted original file");
                    report.mark_source_deleted();
                }
                Err(e) => error!(path = %path.display(), error = %e, "Failed to delete original file"),
            }
        }

        if outcome.is_success() {
            self.notifier.notify(
                &Notice::success(format!("Successfully encrypted: {}", display_name(&path))).with_path(&path),
            );
        }
        report.set_outcome(outcome);
        advance(&mut report, PipelineState::Done);
        report
    }

    async fn route(&self, artifact: &EncryptedArtifact) -> PipelineOutcome {
        match self.router.route(artifact).await {
            RouteResult::Moved(path) => PipelineOutcome::Moved { path },
            RouteResult::Uploaded { backend, locator } => {
                self.notifier.notify(
                    &Notice::success(format!(
                        "Uploaded to {}: {}\nLocation: {}",
                        backend,
                        artifact.file_name(),
                        locator
                    ))
                    .with_path(artifact.path()),
                );
                match tokio::fs::remove_file(artifact.path()).await {
                    Ok(()) => {
                        info!(path = %artifact.path().display(), "Deleted local encrypted file after upload")
                    }
                    Err(e) => {
                        warn!(path = %artifact.path().display(), error = %e, "Failed to delete local encrypted file")
                    }
                }
                PipelineOutcome::Uploaded { backend, locator }
            }
            RouteResult::UploadFailed { backend, error } => {
                self.notifier.notify(
                    &Notice::failure(format!(
                        "{} upload failed: {}\nError: {:#}\nLocal encrypted file kept at: {}",
                        backend,
                        artifact.file_name(),
                        error,
                        artifact.path().display()
                    ))
                    .with_path(artifact.path()),
                );
                PipelineOutcome::UploadFailedKept {
                    artifact: artifact.path().to_path_buf(),
                    reason: format!("{error:#}"),
                }
            }
            RouteResult::MoveFailed(e) => {
                self.notifier.notify(
                    &Notice::failure(format!(
                        "Failed to move {} to destination\nError: {}\nEncrypted file kept at: {}",
                        artifact.file_name(),
                        e,
                        artifact.path().display()
                    ))
                    .with_path(artifact.path()),
                );
                PipelineOutcome::MoveFailed {
                    artifact: artifact.path().to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn advance(report: &mut PipelineReport, next: PipelineState) {
    debug!(path = %report.path().display(), from = %report.state(), to = %next, "Pipeline transition");
    if let Err(e) = report.advance(next) {
        error!(path = %report.path().display(), error = %e, "Invalid pipeline transition");
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::LocalMover;
    use async_trait::async_trait;
    use gpgwatch_core::ports::{EncryptionOutput, IEncryptionEngine, KeyInfo};
    use std::path::PathBuf;

    struct Echo;

    #[async_trait]
    impl IEncryptionEngine for Echo {
        async fn encrypt(&self, plaintext: &[u8], _: &str, _: bool) -> anyhow::Result<EncryptionOutput> {
            Ok(EncryptionOutput::success(plaintext.iter().rev().copied().collect()))
        }

        async fn list_keys(&self) -> anyhow::Result<Vec<KeyInfo>> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(dest: &Path) -> Orchestrator {
        Orchestrator::new(
            Encryptor::new(Arc::new(Echo), "k"),
            DestinationRouter::local(LocalMover::new(dest)),
        )
        .with_settle(SettleWaiter::from_millis(0))
        .with_filter(ExtensionFilter::new(Some([".csv"])))
    }

    fn file(path: PathBuf) -> CreatedEntry {
        CreatedEntry {
            path,
            is_directory: false,
        }
    }

    #[test]
    fn admit_skips_directories_artifacts_and_filtered() {
        let dest = tempfile::tempdir().unwrap();
        let orch = orchestrator(dest.path());

        let dir = CreatedEntry {
            path: PathBuf::from("/in/sub.csv"),
            is_directory: true,
        };
        assert_eq!(orch.admit(&dir).unwrap_err(), SkipReason::Directory);
        assert_eq!(
            orch.admit(&file("/in/a.csv.gpg".into())).unwrap_err(),
            SkipReason::Artifact
        );
        assert_eq!(
            orch.admit(&file("/in/a.txt".into())).unwrap_err(),
            SkipReason::FilteredOut
        );
        assert!(orch.guard().is_empty());
    }

    #[test]
    fn admit_drops_duplicates_while_held() {
        let dest = tempfile::tempdir().unwrap();
        let orch = orchestrator(dest.path());

        let ticket = orch.admit(&file("/in/a.csv".into())).unwrap();
        assert_eq!(
            orch.admit(&file("/in/a.csv".into())).unwrap_err(),
            SkipReason::AlreadyProcessing
        );
        drop(ticket);
        assert!(orch.admit(&file("/in/a.csv".into())).is_ok());
    }

    #[tokio::test]
    async fn vanished_file_aborts_without_failure() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let orch = orchestrator(dest.path());

        let report = match orch.handle(file(src.path().join("gone.csv"))).await {
            Dispatch::Ran(report) => report,
            Dispatch::Skipped(reason) => panic!("skipped: {reason}"),
        };

        assert_eq!(report.state(), PipelineState::AbortedVanished);
        assert_eq!(report.outcome(), Some(&PipelineOutcome::Vanished));
        assert!(orch.guard().is_empty());
    }

    #[tokio::test]
    async fn local_run_visits_every_state_in_order() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let source = src.path().join("a.csv");
        std::fs::write(&source, b"abc").unwrap();

        let orch = orchestrator(dest.path()).delete_original(false);
        let Dispatch::Ran(report) = orch.handle(file(source.clone())).await else {
            panic!("skipped");
        };

        assert_eq!(
            report.states(),
            &[
                PipelineState::Detected,
                PipelineState::Guarded,
                PipelineState::Settling,
                PipelineState::Encrypting,
                PipelineState::Routing,
                PipelineState::LocalMoved,
                PipelineState::SourceCleanup,
                PipelineState::Done,
            ]
        );
        assert!(report.is_finished());
        assert!(!report.source_deleted());
        assert!(source.exists());
        assert_eq!(std::fs::read(dest.path().join("a.csv.gpg")).unwrap(), b"cba");
    }
}
