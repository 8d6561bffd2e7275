//! File size stability detection.
//!
//! Browsers and download managers write into the final file name while the
//! transfer is running. A file is treated as complete once its size has not
//! changed for a minimum continuous duration. This is a heuristic: a paused
//! download that is not growing looks finished.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long to watch a file before declaring it stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Duration the file size must remain unchanged.
    pub stable_for: Duration,
    /// Interval between size samples.
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits as long as the file keeps growing.
    pub max_wait: Option<Duration>,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            stable_for: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

impl StabilityPolicy {
    pub fn new(stable_for: Duration, poll_interval: Duration) -> Self {
        Self {
            stable_for,
            poll_interval,
            max_wait: None,
        }
    }

    /// A policy that only checks the file still exists.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, MIN_POLL_INTERVAL)
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Blocks until `path` is stable under this policy.
    ///
    /// Returns `Ok(false)` only when `max_wait` elapses first.
    ///
    /// # Errors
    ///
    /// Propagates the metadata error (typically `NotFound`) if the file
    /// disappears or becomes unreadable while being watched.
    pub fn wait(&self, path: &Path) -> io::Result<bool> {
        let poll_interval = self.poll_interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        let mut previous: Option<u64> = None;
        let mut streak = Duration::ZERO;

        loop {
            let size = fs::metadata(path)?.len();
            if previous == Some(size) {
                streak += poll_interval;
            } else {
                if previous.is_some() {
                    trace!(path = %path.display(), size, "file size changed");
                }
                streak = Duration::ZERO;
            }
            previous = Some(size);

            if streak >= self.stable_for {
                return Ok(true);
            }
            if let Some(max_wait) = self.max_wait
                && started.elapsed() >= max_wait
            {
                debug!(path = %path.display(), size, "file still changing, giving up for now");
                return Ok(false);
            }
            thread::sleep(poll_interval);
        }
    }
}

/// Blocks until the size of `path` has been unchanged for
/// `required_stable_duration`, sampling every `poll_interval`.
///
/// There is no upper bound on the wait; see [`StabilityPolicy::with_max_wait`].
pub fn await_stable(
    path: &Path,
    required_stable_duration: Duration,
    poll_interval: Duration,
) -> io::Result<bool> {
    StabilityPolicy::new(required_stable_duration, poll_interval).wait(path)
}
