//! Fixed settle delay before a new file is read
//!
//! This is a plain debounce: writers that take longer than the delay are
//! not detected. No size polling is done.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

/// Default delay between the creation notice and the first read
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Result of waiting on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Ready,
    Vanished,
}

#[derive(Debug, Clone, Copy)]
pub struct SettleWaiter {
    delay: Duration,
}

impl Default for SettleWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl SettleWaiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleeps for the delay, then checks that `path` still exists
    pub async fn wait(&self, path: &Path) -> Settled {
        debug!(path = %path.display(), delay_ms = self.delay.as_millis() as u64, "Settling");
        tokio::time::sleep(self.delay).await;

        match tokio::fs::try_exists(path).await {
            Ok(true) => Settled::Ready,
            Ok(false) => {
                warn!(path = %path.display(), "File disappeared before processing");
                Settled::Vanished
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat file after settling");
                Settled::Vanished
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ready_when_file_remains() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let started = tokio::time::Instant::now();
        let settled = SettleWaiter::default().wait(&path).await;

        assert_eq!(settled, Settled::Ready);
        assert!(started.elapsed() >= DEFAULT_SETTLE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_when_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let settled = SettleWaiter::from_millis(10).wait(&dir.path().join("gone.txt")).await;
        assert_eq!(settled, Settled::Vanished);
    }

    #[test]
    fn default_delay_is_half_a_second() {
        assert_eq!(SettleWaiter::default().delay(), Duration::from_millis(500));
    }
}
