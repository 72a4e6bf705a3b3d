//! Integration tests for the dispatch scheduler.
//!
//! These run on tokio's paused clock, so backoff delays of minutes complete
//! instantly and deterministically.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rollout_scheduler::{
    ConfigurationSource, MemoryQueue, QueueError, Scheduler, SchedulerConfig, Subscription,
    TokioClock, WallClock, WatchedSource, WorkQueue,
};
use rollout_window::RawWindow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

async fn wait_until(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(1)).await;
    }
    condition()
}

fn filled_queue(n: u32) -> Arc<MemoryQueue<u32>> {
    let queue = Arc::new(MemoryQueue::new());
    queue.extend(0..n);
    queue
}

// 2024-01-01 was a Monday
fn monday(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, second).unwrap()
}

// Reads exact time once, then trails it by a few milliseconds, like a wall
// clock that drifts behind the monotonic one.
struct TrailingClock {
    inner: TokioClock,
    read_once: AtomicBool,
}

impl WallClock for TrailingClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.inner.now();
        if self.read_once.swap(true, Ordering::Relaxed) {
            now - TimeDelta::milliseconds(5)
        } else {
            now
        }
    }
}

// Fails every fetch with a backend error
struct BrokenQueue {
    calls: AtomicU64,
}

impl WorkQueue for BrokenQueue {
    type Item = ();

    async fn next_scheduled(&self) -> Result<(), QueueError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(QueueError::Backend("connection refused".into()))
    }

    async fn mark_dispatched(&self, _item: ()) -> Result<(), QueueError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_windows_dispatches_back_to_back() {
    let source = Arc::new(WatchedSource::new(None));
    let queue = filled_queue(100);
    let scheduler = Scheduler::start(source, Arc::clone(&queue), SchedulerConfig::default());

    let started = Instant::now();
    assert!(wait_until(|| queue.dispatched_count() == 100, Duration::from_secs(1)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(queue.take_dispatched(), (0..100).collect::<Vec<_>>());

    let metrics = Arc::clone(scheduler.metrics());
    scheduler.stop().await.unwrap();
    assert_eq!(metrics.dispatched(), 100);
    assert_eq!(metrics.schedules_built(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_limited_rate_spaces_dispatches() {
    let source = Arc::new(WatchedSource::new(Some(vec![RawWindow::with_rate("10/sec")])));
    let queue = filled_queue(1_000);
    let scheduler = Scheduler::start(source, Arc::clone(&queue), SchedulerConfig::default());

    sleep(Duration::from_millis(950)).await;
    scheduler.stop().await.unwrap();

    // permits at 0ms, 100ms, ..., 900ms
    assert_eq!(queue.dispatched_count(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_window_holds_until_reconfigured() {
    let source = Arc::new(WatchedSource::new(Some(vec![RawWindow::with_rate(0)])));
    let queue = filled_queue(5);
    let scheduler = Scheduler::start(Arc::clone(&source), Arc::clone(&queue), SchedulerConfig::default());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(queue.dispatched_count(), 0);
    assert_eq!(queue.pending_count(), 5);

    source.set(Some(vec![RawWindow::with_rate("unlimited")]));
    assert!(wait_until(|| queue.dispatched_count() == 5, Duration::from_secs(1)).await);

    // one for the blocked window, at least one more after the push
    assert!(scheduler.metrics().schedules_built() >= 2);
    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_empty_queue_backs_off_exponentially() {
    let source = Arc::new(WatchedSource::new(None));
    let queue = Arc::new(MemoryQueue::<u32>::new());
    let scheduler = Scheduler::start(source, Arc::clone(&queue), SchedulerConfig::default());
    let metrics = Arc::clone(scheduler.metrics());

    // polls at 0s, 5s, 15s, 35s; the next one is due at 75s
    sleep(Duration::from_secs(36)).await;
    assert_eq!(metrics.empty_polls(), 4);

    queue.push(7);
    sleep(Duration::from_secs(34)).await;
    assert_eq!(queue.dispatched_count(), 0, "item must wait out the backoff");

    sleep(Duration::from_secs(6)).await;
    assert_eq!(queue.take_dispatched(), vec![7]);

    // the dispatch reset the backoff: the empty poll right after it asked
    // for 5s, so the next one lands at 80s rather than a minute later
    let polls = metrics.empty_polls();
    sleep(Duration::from_secs(6)).await;
    assert_eq!(metrics.empty_polls(), polls + 1);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_queue_errors_back_off_like_empty_polls() {
    let source = Arc::new(WatchedSource::new(None));
    let queue = Arc::new(BrokenQueue {
        calls: AtomicU64::new(0),
    });
    let scheduler = Scheduler::start(source, Arc::clone(&queue), SchedulerConfig::default());

    sleep(Duration::from_secs(16)).await;
    assert_eq!(queue.calls.load(Ordering::Relaxed), 3);
    assert_eq!(scheduler.metrics().queue_errors(), 3);
    assert_eq!(scheduler.metrics().empty_polls(), 0);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_windows_are_reported_and_siblings_apply() {
    let source: Arc<dyn ConfigurationSource> = Arc::new(WatchedSource::new(Some(vec![
        RawWindow::with_rate("10/sec"),
        RawWindow::with_rate("-1/min"),
    ])));
    let queue = filled_queue(1_000);
    let scheduler = Scheduler::start(source, Arc::clone(&queue), SchedulerConfig::default());

    sleep(Duration::from_millis(450)).await;
    assert_eq!(scheduler.metrics().config_errors(), 1);
    assert_eq!(scheduler.configuration().snapshot().len(), 1);
    // still paced at 10/sec
    assert_eq!(queue.dispatched_count(), 5);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconfiguration_changes_rate() {
    let source = Arc::new(WatchedSource::new(Some(vec![RawWindow::with_rate("1/sec")])));
    let queue = filled_queue(1_000);
    let scheduler = Scheduler::start(Arc::clone(&source), Arc::clone(&queue), SchedulerConfig::default());

    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(queue.dispatched_count(), 3);

    source.set(Some(vec![RawWindow::with_rate("unlimited")]));
    assert!(wait_until(|| queue.pending_count() == 0, Duration::from_secs(1)).await);
    assert!(scheduler.metrics().schedules_built() >= 2);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_dispatch() {
    let source = Arc::new(WatchedSource::new(Some(vec![RawWindow::with_rate("100/sec")])));
    let queue = filled_queue(10_000);
    let scheduler = Scheduler::start(source, Arc::clone(&queue), SchedulerConfig::fast_poll());

    sleep(Duration::from_millis(100)).await;
    scheduler.stop().await.unwrap();
    let after_stop = queue.dispatched_count();
    assert!(after_stop > 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(queue.dispatched_count(), after_stop);
}

#[tokio::test(start_paused = true)]
async fn test_stop_with_source_that_never_notifies() {
    // the source drops the watch callback, so only the initial value arrives
    struct Silent;
    impl ConfigurationSource for Silent {
        fn get(&self) -> Option<Vec<RawWindow>> {
            None
        }
        fn watch(&self, _callback: rollout_scheduler::WatchCallback) -> Subscription {
            Subscription::detached()
        }
    }

    let scheduler = Scheduler::start(Arc::new(Silent), filled_queue(1), SchedulerConfig::default());
    assert!(
        tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
            .await
            .is_ok()
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_watch_subscription() {
    let source = Arc::new(WatchedSource::new(None));

    for _ in 0..3 {
        let scheduler = Scheduler::start(
            Arc::clone(&source),
            filled_queue(1),
            SchedulerConfig::default(),
        );
        assert_eq!(source.watcher_count(), 1);
        scheduler.stop().await.unwrap();
    }

    assert_eq!(source.watcher_count(), 0);
    // nobody left to notify
    source.set(Some(vec![RawWindow::with_rate("unlimited")]));
}

#[tokio::test(start_paused = true)]
async fn test_window_boundary_rebuilds_without_config_push() {
    let source = Arc::new(WatchedSource::new(Some(vec![
        RawWindow::with_rate(0),
        RawWindow::with_rate("20/hr")
            .days(["mon"])
            .between("01:15", "02:30"),
    ])));
    let queue = filled_queue(100);
    let clock = Arc::new(TokioClock::anchored(monday(1, 14, 0)));
    let scheduler = Scheduler::start_with_clock(
        source,
        Arc::clone(&queue),
        SchedulerConfig::default(),
        clock,
    );
    let metrics = Arc::clone(scheduler.metrics());

    sleep(Duration::from_secs(59)).await;
    assert_eq!(queue.dispatched_count(), 0, "blocked until 01:15");
    assert_eq!(metrics.schedules_built(), 1);

    // 01:15:01
    sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.dispatched_count(), 1);
    assert_eq!(metrics.schedules_built(), 2);

    // 20/hr keeps three minutes between dispatches
    sleep(Duration::from_secs(170)).await;
    assert_eq!(queue.dispatched_count(), 1);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(queue.dispatched_count(), 2);
    assert_eq!(metrics.schedules_built(), 2);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_trailing_wall_clock_does_not_rebuild_the_expired_window() {
    let source = Arc::new(WatchedSource::new(Some(vec![
        RawWindow::with_rate("1/min"),
        RawWindow::with_rate("1/min")
            .days(["mon"])
            .between("01:15", "02:30"),
    ])));
    let queue = filled_queue(100);
    let clock = Arc::new(TrailingClock {
        inner: TokioClock::anchored(monday(1, 14, 30)),
        read_once: AtomicBool::new(false),
    });
    let scheduler = Scheduler::start_with_clock(
        source,
        Arc::clone(&queue),
        SchedulerConfig::default(),
        clock,
    );

    // one dispatch from each window, none from a sliver of the first
    sleep(Duration::from_secs(31)).await;
    assert_eq!(queue.dispatched_count(), 2);
    assert_eq!(scheduler.metrics().schedules_built(), 2);

    scheduler.stop().await.unwrap();
}
