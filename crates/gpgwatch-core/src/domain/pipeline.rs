//! Per-file pipeline state machine and run report
//!
//! ```text
//! Detected -> Guarded -> Settling -> Encrypting -> Routing -> <route> -> SourceCleanup -> Done
//!                           |            |
//!                    AbortedVanished  FailedEncrypt
//! ```
//!
//! `<route>` is one of `LocalMoved`, `Uploaded`, `UploadFailedKept` or
//! `MoveFailed`. States are visited strictly in order and never revisited.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::destination::CloudBackend;
use super::errors::DomainError;
use super::newtypes::RemoteLocator;

/// A step of the per-file pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Detected,
    Guarded,
    Settling,
    AbortedVanished,
    Encrypting,
    FailedEncrypt,
    Routing,
    LocalMoved,
    Uploaded,
    UploadFailedKept,
    MoveFailed,
    SourceCleanup,
    Done,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Detected => "Detected",
            PipelineState::Guarded => "Guarded",
            PipelineState::Settling => "Settling",
            PipelineState::AbortedVanished => "AbortedVanished",
            PipelineState::Encrypting => "Encrypting",
            PipelineState::FailedEncrypt => "FailedEncrypt",
            PipelineState::Routing => "Routing",
            PipelineState::LocalMoved => "LocalMoved",
            PipelineState::Uploaded => "Uploaded",
            PipelineState::UploadFailedKept => "UploadFailedKept",
            PipelineState::MoveFailed => "MoveFailed",
            PipelineState::SourceCleanup => "SourceCleanup",
            PipelineState::Done => "Done",
        }
    }

    /// Terminal states end the pipeline
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::AbortedVanished | PipelineState::FailedEncrypt
        )
    }

    /// Returns true if the state machine allows moving from `self` to `target`
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Detected, Guarded)
                | (Guarded, Settling)
                | (Settling, AbortedVanished)
                | (Settling, Encrypting)
                | (Encrypting, FailedEncrypt)
                | (Encrypting, Routing)
                | (Routing, LocalMoved)
                | (Routing, Uploaded)
                | (Routing, UploadFailedKept)
                | (Routing, MoveFailed)
                | (LocalMoved, SourceCleanup)
                | (Uploaded, SourceCleanup)
                | (UploadFailedKept, SourceCleanup)
                | (MoveFailed, SourceCleanup)
                | (SourceCleanup, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Artifact moved into the local destination directory
    Moved { path: PathBuf },
    /// Artifact uploaded and the local copy removed
    Uploaded {
        backend: CloudBackend,
        locator: RemoteLocator,
    },
    /// Upload failed; the artifact is kept on disk for a later retry
    UploadFailedKept { artifact: PathBuf, reason: String },
    /// Local move failed; the artifact is left where it was encrypted
    MoveFailed { artifact: PathBuf, reason: String },
    /// The file disappeared while settling
    Vanished,
    /// Encryption failed; no artifact was created
    EncryptionFailed { reason: String },
}

impl PipelineOutcome {
    /// Returns true when the artifact reached its destination
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PipelineOutcome::Moved { .. } | PipelineOutcome::Uploaded { .. }
        )
    }
}

/// Record of one pipeline run: every visited state plus the final outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    path: PathBuf,
    states: Vec<PipelineState>,
    outcome: Option<PipelineOutcome>,
    source_deleted: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl PipelineReport {
    /// Starts a report in the `Detected` state
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            states: vec![PipelineState::Detected],
            outcome: None,
            source_deleted: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Advances to `next`
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidState`] if the transition is not allowed
    pub fn advance(&mut self, next: PipelineState) -> Result<(), DomainError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(DomainError::InvalidState {
                from: current.name().to_string(),
                to: next.name().to_string(),
            });
        }

        self.states.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Records the outcome; may be set before the terminal state is reached
    pub fn set_outcome(&mut self, outcome: PipelineOutcome) {
        self.outcome = Some(outcome);
    }

    pub fn mark_source_deleted(&mut self) {
        self.source_deleted = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current (last visited) state
    pub fn state(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Detected)
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        self.outcome.as_ref()
    }

    pub fn source_deleted(&self) -> bool {
        self.source_deleted
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn happy_path_local() {
        let mut report = PipelineReport::new("/inbox/report.csv");
        for state in [Guarded, Settling, Encrypting, Routing, LocalMoved, SourceCleanup, Done] {
            report.advance(state).unwrap();
        }
        report.set_outcome(PipelineOutcome::Moved {
            path: PathBuf::from("/out/report.csv.gpg"),
        });

        assert!(report.is_finished());
        assert!(report.finished_at().is_some());
        assert_eq!(report.states().len(), 8);
        assert!(report.outcome().unwrap().is_success());
    }

    #[test]
    fn vanished_is_terminal() {
        let mut report = PipelineReport::new("/inbox/gone.csv");
        report.advance(Guarded).unwrap();
        report.advance(Settling).unwrap();
        report.advance(AbortedVanished).unwrap();

        assert!(report.is_finished());
        assert!(report.advance(Encrypting).is_err());
    }

    #[test]
    fn cannot_skip_guard() {
        let mut report = PipelineReport::new("/inbox/a.csv");
        let err = report.advance(Settling).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidState {
                from: "Detected".to_string(),
                to: "Settling".to_string(),
            }
        );
        assert_eq!(report.state(), Detected);
    }

    #[test]
    fn no_revisits() {
        let mut report = PipelineReport::new("/inbox/a.csv");
        report.advance(Guarded).unwrap();
        assert!(report.advance(Guarded).is_err());
    }

    #[test]
    fn every_route_leads_to_cleanup() {
        for route in [LocalMoved, Uploaded, UploadFailedKept, MoveFailed] {
            assert!(Routing.can_transition_to(route));
            assert!(route.can_transition_to(SourceCleanup));
            assert!(!route.is_terminal());
        }
    }

    #[test]
    fn failed_outcomes_are_not_success() {
        let kept = PipelineOutcome::UploadFailedKept {
            artifact: PathBuf::from("/inbox/a.csv.gpg"),
            reason: "HTTP 500".to_string(),
        };
        assert!(!kept.is_success());
        assert!(!PipelineOutcome::Vanished.is_success());
    }
}
