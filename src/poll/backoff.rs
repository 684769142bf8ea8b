//! Poll policy and backoff schedule

use std::time::Duration;

/// Polling knobs for one endpoint.
///
/// The defaults are shared; endpoints that want a different cadence pass
/// their own policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// First wait when the server sends no `poll_after_ms` hint
    pub default_interval: Duration,
    /// Growth factor applied after every non-terminal poll
    pub multiplier: f64,
    /// Upper bound on any single wait
    pub max_interval: Duration,
    /// Maximum number of status polls
    pub max_attempts: u32,
    /// Maximum time spent polling, measured from the start of polling
    pub max_elapsed: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_millis(1000),
            multiplier: 1.2,
            max_interval: Duration::from_millis(5000),
            max_attempts: 30,
            max_elapsed: Duration::from_millis(300_000),
        }
    }
}

impl PollPolicy {
    /// Backoff schedule starting from the server hint, if any.
    pub fn backoff(&self, hint: Option<Duration>) -> Backoff {
        Backoff::new(
            hint.unwrap_or(self.default_interval),
            self.multiplier,
            self.max_interval,
        )
    }
}

/// Non-decreasing, capped wait schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            // a shrinking factor would break monotonicity
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
            max,
        }
    }

    /// The wait to use now.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grow the wait for the next poll.
    pub fn advance(&mut self) {
        // millisecond resolution keeps the schedule exact (1000, 1200, 1440, ...)
        let next = (self.current.as_millis() as f64 * self.multiplier).round();
        self.current = if next >= self.max.as_millis() as f64 {
            self.max
        } else {
            Duration::from_millis(next as u64)
        };
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        self.advance();
        Some(delay)
    }
}
