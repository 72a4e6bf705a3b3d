use crate::invariants::debug_assert_backoff_capped;
use std::time::Duration;

/// Capped exponential backoff for empty work-queue polls.
///
/// Each call to [`next_delay`](Self::next_delay) returns the current delay and
/// grows it by `multiplier`, never past `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    init: Duration,
    multiplier: u32,
    limit: Duration,
    current: Duration,
}

impl Backoff {
    pub const DEFAULT_INIT: Duration = Duration::from_secs(5);
    pub const DEFAULT_MULTIPLIER: u32 = 2;
    pub const DEFAULT_LIMIT: Duration = Duration::from_secs(60);

    /// Creates a backoff. A multiplier of zero is treated as one, and `init`
    /// is clamped to `limit`.
    pub fn new(init: Duration, multiplier: u32, limit: Duration) -> Self {
        let init = init.min(limit);
        Self {
            init,
            multiplier: multiplier.max(1),
            limit,
            current: init,
        }
    }

    /// Returns the delay to apply now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .map_or(self.limit, |next| next.min(self.limit));

        // INV-BACK-01: never exceed the cap
        debug_assert_backoff_capped!(delay, self.limit);
        delay
    }

    /// Back to the initial delay.
    #[inline]
    pub fn reset(&mut self) {
        self.current = self.init;
    }

    #[inline]
    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INIT, Self::DEFAULT_MULTIPLIER, Self::DEFAULT_LIMIT)
    }
}
