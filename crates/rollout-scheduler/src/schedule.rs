//! Schedules: a rate limiter bound to a validity deadline.

use crate::rate_limiter::{wait_and_stamp, PacingLimiter, RateLimiterBoxed, YieldingRateLimiter};
use rollout_window::{ActiveRate, DateTime, RateSpec, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Error returned by [`Schedule::take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The schedule is blocked and will never yield. Not transient: retrying
    /// the same schedule returns this again.
    #[error("schedule will never yield")]
    Zero,
}

/// A live limiter for one rate, valid until the next window boundary.
///
/// Schedules are never updated in place. When the active window changes a
/// new schedule replaces the old one.
pub struct Schedule {
    limiter: Option<Box<dyn RateLimiterBoxed>>,
    rate: RateSpec,
    duration: Option<Duration>,
    valid_until: Option<Instant>,
}

impl Schedule {
    /// Builds a schedule starting at `base` and lasting `duration`.
    ///
    /// `None` means the schedule never expires. The deadline is computed on
    /// the monotonic clock, so wall-clock adjustments cannot stretch or shrink
    /// it.
    pub fn new(base: Instant, duration: Option<Duration>, rate: RateSpec) -> Self {
        let limiter: Option<Box<dyn RateLimiterBoxed>> = match rate {
            RateSpec::Blocked => None,
            RateSpec::Unlimited => Some(Box::new(YieldingRateLimiter)),
            RateSpec::Limited { .. } => match rate.spacing() {
                Some(period) if !period.is_zero() => Some(Box::new(PacingLimiter::new(period))),
                // faster than the clock resolution
                _ => Some(Box::new(YieldingRateLimiter)),
            },
        };
        Self {
            limiter,
            rate,
            duration,
            valid_until: duration.and_then(|d| base.checked_add(d)),
        }
    }

    /// Builds the schedule for the rate active at `now`, `base` being the
    /// monotonic instant corresponding to `now`.
    pub fn from_active(active: &ActiveRate, now: DateTime<Utc>, base: Instant) -> Self {
        Self::new(base, active.remaining(now), active.rate)
    }

    /// Waits for permission to dispatch one item.
    ///
    /// Blocked schedules return [`ScheduleError::Zero`] immediately, on every
    /// call. Unlimited schedules return at once. Limited schedules wait until
    /// the minimum spacing since the previous permit has passed.
    pub async fn take(&mut self) -> Result<Instant, ScheduleError> {
        match self.limiter.as_mut() {
            Some(limiter) => Ok(wait_and_stamp(limiter.as_mut()).await),
            None => Err(ScheduleError::Zero),
        }
    }

    /// When this schedule stops applying, `None` if never.
    pub fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }

    pub fn rate(&self) -> RateSpec {
        self.rate
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Gap the limiter keeps between permits. `None` for blocked and
    /// unlimited schedules.
    pub fn spacing(&self) -> Option<Duration> {
        self.limiter.as_ref().and_then(|limiter| limiter.spacing())
    }

    /// Estimated number of permits over the whole validity period.
    ///
    /// `-1` for unlimited, `0` for blocked, `i64::MAX` for a limited schedule
    /// that never expires. Advisory only.
    pub fn total(&self) -> i64 {
        match (self.rate, self.duration) {
            (RateSpec::Limited { .. }, None) => i64::MAX,
            (rate, Some(duration)) => rate.events_over(duration),
            (rate, None) => rate.events_over(Duration::ZERO),
        }
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("rate", &self.rate)
            .field("spacing", &self.spacing())
            .field("duration", &self.duration)
            .field("valid_until", &self.valid_until)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_window::RateUnit;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_blocked_never_yields() {
        let mut schedule = Schedule::new(Instant::now(), Some(HOUR), RateSpec::Blocked);
        for _ in 0..100 {
            assert_eq!(schedule.take().await, Err(ScheduleError::Zero));
        }
    }

    #[tokio::test]
    async fn test_unlimited_does_not_wait() {
        let mut schedule = Schedule::new(Instant::now(), None, RateSpec::Unlimited);
        let start = std::time::Instant::now();
        for _ in 0..1000 {
            assert!(schedule.take().await.is_ok());
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limited_spacing() {
        let rate = RateSpec::limited(100, RateUnit::Second);
        let mut schedule = Schedule::new(Instant::now(), Some(HOUR), rate);

        let mut last = schedule.take().await.unwrap();
        for _ in 0..20 {
            let next = schedule.take().await.unwrap();
            assert!(next - last >= Duration::from_millis(10));
            last = next;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_until_is_monotonic_offset() {
        let base = Instant::now();
        let schedule = Schedule::new(base, Some(Duration::from_secs(90)), RateSpec::Unlimited);
        assert_eq!(schedule.valid_until(), Some(base + Duration::from_secs(90)));

        let forever = Schedule::new(base, None, RateSpec::Unlimited);
        assert_eq!(forever.valid_until(), None);
    }

    #[test]
    fn test_total() {
        let base = Instant::now();
        let limited = |count, unit, duration| {
            Schedule::new(base, duration, RateSpec::limited(count, unit)).total()
        };

        assert_eq!(limited(20, RateUnit::Hour, Some(HOUR)), 20);
        assert_eq!(limited(20, RateUnit::Hour, Some(HOUR * 3 / 2)), 30);
        assert_eq!(limited(3, RateUnit::Minute, Some(Duration::from_secs(59))), 2);
        assert_eq!(limited(1, RateUnit::Second, Some(HOUR)), 3600);
        assert_eq!(limited(1, RateUnit::Second, None), i64::MAX);

        assert_eq!(Schedule::new(base, Some(HOUR), RateSpec::Unlimited).total(), -1);
        assert_eq!(Schedule::new(base, None, RateSpec::Unlimited).total(), -1);
        assert_eq!(Schedule::new(base, Some(HOUR), RateSpec::Blocked).total(), 0);
    }

    #[test]
    fn test_spacing_comes_from_limiter() {
        let base = Instant::now();
        let limited = Schedule::new(base, Some(HOUR), RateSpec::limited(4, RateUnit::Second));
        assert_eq!(limited.spacing(), Some(Duration::from_millis(250)));
        assert!(format!("{limited:?}").contains("250ms"));

        assert_eq!(Schedule::new(base, Some(HOUR), RateSpec::Unlimited).spacing(), None);
        assert_eq!(Schedule::new(base, Some(HOUR), RateSpec::Blocked).spacing(), None);
    }

    #[tokio::test]
    async fn test_sub_nanosecond_spacing_does_not_panic() {
        let rate = RateSpec::limited(u32::MAX, RateUnit::Second);
        let mut schedule = Schedule::new(Instant::now(), Some(HOUR), rate);
        assert!(schedule.take().await.is_ok());
    }
}
