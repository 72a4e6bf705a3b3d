//! Configuration for scheduler behavior.

use crate::backoff::Backoff;
use std::time::Duration;

/// Configuration for the dispatch scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay requested from the pacer after the first empty or failed poll.
    ///
    /// Default: 5s
    pub backoff_init: Duration,

    /// Growth factor applied after each further empty or failed poll.
    ///
    /// Default: 2
    pub backoff_multiplier: u32,

    /// Upper bound on the backoff delay.
    ///
    /// Default: 60s
    pub backoff_limit: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backoff_init: Backoff::DEFAULT_INIT,
            backoff_multiplier: Backoff::DEFAULT_MULTIPLIER,
            backoff_limit: Backoff::DEFAULT_LIMIT,
        }
    }
}

impl SchedulerConfig {
    /// Creates a configuration that polls an empty queue aggressively, for
    /// tests and demos.
    pub fn fast_poll() -> Self {
        Self {
            backoff_init: Duration::from_millis(10),
            backoff_multiplier: 2,
            backoff_limit: Duration::from_millis(100),
        }
    }

    /// Sets the initial backoff delay.
    pub fn with_backoff_init(mut self, init: Duration) -> Self {
        self.backoff_init = init;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the backoff cap.
    pub fn with_backoff_limit(mut self, limit: Duration) -> Self {
        self.backoff_limit = limit;
        self
    }

    /// A fresh backoff built from these settings.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_init, self.backoff_multiplier, self.backoff_limit)
    }
}
