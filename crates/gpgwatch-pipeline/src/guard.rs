//! In-flight path registry
//!
//! Every pipeline holds a [`GuardTicket`] for its source path from the moment
//! it is accepted until it reaches a terminal state. A second notification
//! for a path that already holds a ticket is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Shared set of paths currently being processed, with the instant each
/// one was accepted
#[derive(Debug, Clone, Default)]
pub struct ProcessingGuard {
    active: Arc<DashMap<PathBuf, Instant>>,
}

impl ProcessingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` and returns true, or returns false if it is already held
    pub fn try_enter(&self, path: &Path) -> bool {
        match self.active.entry(path.to_path_buf()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }

    /// Removes `path`; a no-op when it is not held
    pub fn leave(&self, path: &Path) {
        self.active.remove(path);
    }

    /// Scoped form of [`try_enter`](Self::try_enter): the ticket leaves on drop
    pub fn acquire(&self, path: &Path) -> Option<GuardTicket> {
        self.try_enter(path).then(|| GuardTicket {
            guard: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.active.contains_key(path)
    }

    /// How long `path` has been held, if it is
    pub fn held_for(&self, path: &Path) -> Option<Duration> {
        self.active.get(path).map(|since| since.elapsed())
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Membership of one path in a [`ProcessingGuard`]; released on drop,
/// including during unwinding
#[derive(Debug)]
pub struct GuardTicket {
    guard: ProcessingGuard,
    path: PathBuf,
}

impl GuardTicket {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        self.guard.leave(&self.path);
    }
}
