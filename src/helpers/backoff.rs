use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use log::debug;

/// How often a waiting backoff checks its running flag
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Reconnect delays with a stepped schedule
///
/// Each call to [`ReconnectBackoff::wait`] sleeps for the next interval of the
/// schedule. Once the schedule is exhausted the last interval repeats.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    attempt: usize,
    intervals: Vec<Duration>,
}

impl ReconnectBackoff {
    /// Backoff with a custom schedule; an empty schedule falls back to the default
    pub fn with_intervals(intervals: Vec<Duration>) -> Self {
        let intervals = if intervals.is_empty() { default_intervals() } else { intervals };
        Self { attempt: 0, intervals }
    }

    /// Number of completed waits
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Delay the next call to `wait` will sleep for
    pub fn current_delay(&self) -> Duration {
        let index = cmp::min(self.attempt, self.intervals.len() - 1);
        self.intervals[index]
    }

    /// Sleep for the current delay, waking early if `running` is cleared
    ///
    /// Returns false when interrupted.
    pub fn wait(&mut self, running: &AtomicBool) -> bool {
        let delay = self.current_delay();
        debug!("Reconnect attempt {}: waiting {:?}", self.attempt + 1, delay);

        let mut remaining = delay;
        while !remaining.is_zero() {
            if !running.load(Ordering::SeqCst) {
                debug!("Reconnect wait interrupted by shutdown");
                return false;
            }
            let step = cmp::min(CHECK_INTERVAL, remaining);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }

        self.attempt += 1;
        running.load(Ordering::SeqCst)
    }
}

/// The standard reconnect schedule: 1s, 2s, 4s, 8s, 15s, 30s, 60s
pub fn default_intervals() -> Vec<Duration> {
    [1, 2, 4, 8, 15, 30, 60].iter().map(|s| Duration::from_secs(*s)).collect()
}
