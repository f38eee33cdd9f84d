//! Runner clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Monotonic clock on the lottery timeline.
///
/// Reads `start + elapsed`, with `elapsed` measured by tokio's clock so paused
/// test runtimes control it. Starting from the wall clock keeps persisted
/// deadlines meaningful across restarts.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Duration,
    origin: Instant,
}

impl Clock {
    /// A clock reading `start` now.
    pub fn starting_at(start: Duration) -> Self {
        Self {
            start,
            origin: Instant::now(),
        }
    }

    /// A clock reading time since the Unix epoch.
    pub fn system() -> Self {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::starting_at(start)
    }

    /// Current time.
    pub fn now(&self) -> Duration {
        self.start + self.origin.elapsed()
    }
}
