//! Rollout Scheduler
//!
//! A rate-limited, time-windowed work dispatcher. Given the site's rollout
//! windows (see [`rollout_window`]), the scheduler works out which rate
//! applies right now, paces permits at that rate until the next window
//! boundary, and on each permit releases one item from a [`WorkQueue`].
//!
//! ```text
//! ConfigurationSource ──▶ Configuration ──▶ Schedule ──▶ Pacer ──▶ Scheduler ──▶ WorkQueue
//! ```
//!
//! - **Blocked** rates (`0`) release nothing until the window ends.
//! - **Unlimited** rates, and instants no window covers, release as fast as
//!   the queue can supply items.
//! - **Limited** rates (`"N/unit"`) keep at least `unit / N` between releases.
//!
//! When the queue is empty the scheduler asks the pacer to back off
//! exponentially (5s doubling up to 60s by default) instead of busy-polling.
//!
//! # Example
//!
//! ```ignore
//! use rollout_scheduler::{MemoryQueue, Scheduler, SchedulerConfig, WatchedSource};
//! use rollout_window::RawWindow;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(WatchedSource::new(Some(vec![
//!         RawWindow::with_rate("10/sec"),
//!     ])));
//!     let queue = Arc::new(MemoryQueue::new());
//!     queue.extend(0..100u32);
//!
//!     let scheduler = Scheduler::start(source.clone(), queue.clone(), SchedulerConfig::default());
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!
//!     // operators can change the rate at any time
//!     source.set(Some(vec![RawWindow::with_rate("unlimited")]));
//!
//!     scheduler.stop().await.unwrap();
//! }
//! ```

mod backoff;
pub mod clock;
mod config;
mod invariants;
pub mod pacer;
pub mod queue;
pub mod rate_limiter;
pub mod schedule;
pub mod scheduler;
pub mod source;

pub use backoff::Backoff;
pub use clock::{SystemClock, TokioClock, WallClock};
pub use config::SchedulerConfig;
pub use pacer::{Offer, Pacer, PacerState};
pub use queue::{MemoryQueue, QueueError, WorkQueue};
pub use rate_limiter::{PacingLimiter, RateLimiter, RateLimiterBoxed, YieldingRateLimiter};
pub use schedule::{Schedule, ScheduleError};
pub use scheduler::{Scheduler, SchedulerError, SchedulerMetrics};
pub use source::{ConfigurationSource, Subscription, WatchCallback, WatchedSource};
