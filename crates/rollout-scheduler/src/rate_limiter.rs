//! Permit sources for schedules.
//!
//! A [`Schedule`](crate::Schedule) holds one of these behind a trait object
//! and awaits it once per dispatch. Blocked rates have no limiter at all.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Grants dispatch permits, one per completed [`wait`](Self::wait).
pub trait RateLimiter: Send {
    /// Resolves when the next permit is available.
    fn wait(&mut self) -> impl Future<Output = ()> + Send;

    /// Guaranteed gap between two permits; `None` when permits are not
    /// spaced.
    fn spacing(&self) -> Option<Duration> {
        None
    }
}

/// [`RateLimiter`] with a boxed future, usable as `dyn RateLimiterBoxed`.
pub trait RateLimiterBoxed: Send {
    fn wait_boxed(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn spacing(&self) -> Option<Duration>;
}

impl<T: RateLimiter> RateLimiterBoxed for T {
    fn wait_boxed(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.wait())
    }

    fn spacing(&self) -> Option<Duration> {
        RateLimiter::spacing(self)
    }
}

/// Token-pacing limiter: one permit per `period`, burst of one.
///
/// The first `wait()` completes immediately. Missed ticks are delayed rather
/// than bursted, so two permits are never closer than `period` even after the
/// caller stalls.
///
/// The underlying [`Interval`] is created on first use so a limiter can be
/// built outside a runtime.
pub struct PacingLimiter {
    period: Duration,
    interval: Option<Interval>,
}

impl PacingLimiter {
    /// # Panics
    ///
    /// Panics if `period` is zero; use [`YieldingRateLimiter`] for no pacing.
    pub fn new(period: Duration) -> Self {
        assert!(!period.is_zero(), "period must be positive");
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl RateLimiter for PacingLimiter {
    async fn wait(&mut self) {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }

    fn spacing(&self) -> Option<Duration> {
        Some(self.period)
    }
}

/// Grants every permit at once, yielding to the runtime in between so an
/// unlimited pacer cannot starve other tasks.
pub struct YieldingRateLimiter;

impl RateLimiter for YieldingRateLimiter {
    async fn wait(&mut self) {
        tokio::task::yield_now().await;
    }
}

/// Waits for one permit and returns the instant it was granted.
pub async fn wait_and_stamp<L: RateLimiterBoxed + ?Sized>(limiter: &mut L) -> Instant {
    limiter.wait_boxed().await;
    Instant::now()
}
