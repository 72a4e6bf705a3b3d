//! Wall-clock sources.
//!
//! Window matching needs calendar time, pacing needs monotonic time. The
//! scheduler reads calendar time only through [`WallClock`], so tests can
//! tie it to tokio's paused clock and cross window boundaries instantly.

use rollout_window::{DateTime, Utc};
use tokio::time::Instant;

/// A source of the current UTC time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Calendar time that advances with the tokio clock from a fixed anchor.
///
/// Under `#[tokio::test(start_paused = true)]` this moves exactly as far as
/// the runtime's virtual time does.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    /// A clock reading `anchor` right now.
    pub fn anchored(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: Instant::now(),
        }
    }
}

impl WallClock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::TimeDelta::from_std(self.origin.elapsed())
            .unwrap_or(chrono::TimeDelta::MAX);
        self.anchor
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let anchor = Utc.with_ymd_and_hms(2024, 1, 1, 1, 14, 0).unwrap();
        let clock = TokioClock::anchored(anchor);
        assert_eq!(clock.now(), anchor);

        tokio::time::sleep(Duration::from_secs(90)).await;
        let drift = clock.now() - Utc.with_ymd_and_hms(2024, 1, 1, 1, 15, 30).unwrap();
        // the timer wheel rounds deadlines up to the next millisecond
        assert!(drift >= chrono::TimeDelta::zero());
        assert!(drift < chrono::TimeDelta::milliseconds(2));
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
