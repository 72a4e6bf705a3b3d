//! The dispatch supervisor.
//!
//! A [`Scheduler`] owns exactly one [`Pacer`] at a time, built from the
//! schedule of whichever rollout window is active. Its loop races four
//! events:
//!
//! - an offer from the pacer: pull the next item from the [`WorkQueue`],
//! - the schedule's validity deadline passing: rebuild for "now",
//! - a configuration change: re-read the windows and rebuild for "now",
//! - a stop request: stop the pacer and exit.
//!
//! The backoff for an empty queue is applied inside the pacer (as the reply
//! to its offer), never in this loop, so the scheduler stays responsive to
//! configuration changes while the pacer sleeps.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_pacer_stopped;
use crate::backoff::Backoff;
use crate::clock::{SystemClock, WallClock};
use crate::config::SchedulerConfig;
use crate::pacer::{Offer, Pacer};
use crate::queue::{QueueError, WorkQueue};
use crate::schedule::Schedule;
use crate::source::{ConfigurationSource, Subscription};
use rollout_window::{log_parse_errors, Configuration, DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

/// Error types for scheduler lifecycle operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The supervising task panicked or was cancelled.
    #[error("scheduler task failed: {0}")]
    TaskFailed(String),
}

/// Thread-safe scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Items fetched and marked dispatched
    pub dispatched: AtomicU64,
    /// Offers answered with backoff because the queue was empty
    pub empty_polls: AtomicU64,
    /// Offers answered with backoff because the queue failed
    pub queue_errors: AtomicU64,
    /// Schedules built, including the first one
    pub schedules_built: AtomicU64,
    /// Configuration pushes that contained invalid windows
    pub config_errors: AtomicU64,
}

impl SchedulerMetrics {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn empty_polls(&self) -> u64 {
        self.empty_polls.load(Ordering::Relaxed)
    }

    pub fn queue_errors(&self) -> u64 {
        self.queue_errors.load(Ordering::Relaxed)
    }

    pub fn schedules_built(&self) -> u64 {
        self.schedules_built.load(Ordering::Relaxed)
    }

    pub fn config_errors(&self) -> u64 {
        self.config_errors.load(Ordering::Relaxed)
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle to a running dispatch scheduler.
pub struct Scheduler {
    configuration: Arc<Configuration>,
    metrics: Arc<SchedulerMetrics>,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Scheduler {
    /// Subscribes to `source` and spawns the supervising task.
    ///
    /// The task waits for the first configuration before building a
    /// schedule. The current value of `source` is delivered as that first
    /// configuration. Windows are matched against the system clock.
    pub fn start<S, Q>(source: Arc<S>, queue: Arc<Q>, config: SchedulerConfig) -> Self
    where
        S: ConfigurationSource + ?Sized + 'static,
        Q: WorkQueue + 'static,
    {
        Self::start_with_clock(source, queue, config, Arc::new(SystemClock))
    }

    /// Like [`start`](Self::start), matching windows against `clock`.
    ///
    /// The subscription to `source` lives as long as the supervising task.
    pub fn start_with_clock<S, Q>(
        source: Arc<S>,
        queue: Arc<Q>,
        config: SchedulerConfig,
        clock: Arc<dyn WallClock>,
    ) -> Self
    where
        S: ConfigurationSource + ?Sized + 'static,
        Q: WorkQueue + 'static,
    {
        let configuration = Arc::new(Configuration::new());
        let metrics = Arc::new(SchedulerMetrics::default());

        // Capacity 1 coalesces bursts: every rebuild re-reads the source.
        let (changed_tx, changed_rx) = mpsc::channel::<()>(1);
        let watcher = changed_tx.clone();
        let subscription = source.watch(Box::new(move || {
            let _ = watcher.try_send(());
        }));
        let _ = changed_tx.try_send(());
        drop(changed_tx);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = Supervisor {
            source,
            queue,
            configuration: Arc::clone(&configuration),
            metrics: Arc::clone(&metrics),
            backoff: config.backoff(),
            clock,
            boundary: None,
            _subscription: subscription,
        };
        let task = tokio::spawn(supervisor.run(changed_rx, shutdown_rx));

        Self {
            configuration,
            metrics,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// The windows the scheduler is currently working from.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    /// Stops the active pacer and waits for the supervising task to exit.
    pub async fn stop(mut self) -> Result<(), SchedulerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| SchedulerError::TaskFailed(e.to_string()))?;
        }
        Ok(())
    }
}

struct Supervisor<S: ?Sized, Q> {
    source: Arc<S>,
    queue: Arc<Q>,
    configuration: Arc<Configuration>,
    metrics: Arc<SchedulerMetrics>,
    backoff: Backoff,
    clock: Arc<dyn WallClock>,
    /// Wall-clock boundary the current schedule runs until.
    boundary: Option<DateTime<Utc>>,
    _subscription: Subscription,
}

impl<S, Q> Supervisor<S, Q>
where
    S: ConfigurationSource + ?Sized + 'static,
    Q: WorkQueue + 'static,
{
    async fn run(
        mut self,
        mut changed: mpsc::Receiver<()>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        // Initializing: nothing to pace until the first configuration arrives.
        tokio::select! {
            biased;
            _ = &mut shutdown => return,
            first = changed.recv() => {
                if first.is_none() {
                    return;
                }
            }
        }
        self.reload();

        let mut pacer = self.build_pacer(None);
        let mut pacer_open = true;
        let mut changes_open = true;

        loop {
            let mut floor = None;
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!("scheduler: stop requested");
                    pacer.stop().await;
                    break;
                }
                change = changed.recv(), if changes_open => {
                    if change.is_some() {
                        self.reload();
                    } else {
                        // source dropped our callback; keep the last windows
                        changes_open = false;
                        continue;
                    }
                }
                () = expired(pacer.valid_until()) => {
                    debug!("scheduler: schedule expired");
                    // the wall clock may trail the monotonic deadline slightly
                    floor = self.boundary;
                }
                offer = pacer.recv(), if pacer_open => {
                    match offer {
                        Some(offer) => self.dispatch(offer).await,
                        // a finished pacer is not an error
                        None => pacer_open = false,
                    }
                    continue;
                }
            }

            // Either the window list changed or time moved past a boundary:
            // work out afresh which window applies now.
            pacer.stop().await;
            #[cfg(debug_assertions)]
            debug_assert_pacer_stopped!(pacer.state());
            pacer = self.build_pacer(floor);
            pacer_open = true;
        }
    }

    fn reload(&self) {
        let raw = self.source.get();
        if let Err(errors) = self.configuration.update(raw.as_deref()) {
            SchedulerMetrics::inc(&self.metrics.config_errors);
            log_parse_errors(&errors);
        }
    }

    /// Starts a pacer for the window active now, never earlier than `floor`.
    fn build_pacer(&mut self, floor: Option<DateTime<Utc>>) -> Pacer {
        let now = match floor {
            Some(floor) => self.clock.now().max(floor),
            None => self.clock.now(),
        };
        let base = Instant::now();
        let active = self.configuration.active(now);
        let schedule = Schedule::from_active(&active, now, base);
        self.boundary = active.until;

        info!(
            rate = %schedule.rate(),
            spacing = ?schedule.spacing(),
            valid_for = ?schedule.duration(),
            total = schedule.total(),
            "scheduler: new schedule"
        );
        SchedulerMetrics::inc(&self.metrics.schedules_built);
        Pacer::start(schedule)
    }

    async fn dispatch(&mut self, offer: Offer) {
        let outcome = match self.queue.next_scheduled().await {
            Ok(item) => self.queue.mark_dispatched(item).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                SchedulerMetrics::inc(&self.metrics.dispatched);
                debug!("scheduler: dispatched item");
                self.backoff.reset();
                offer.proceed();
            }
            Err(QueueError::NotFound) => {
                SchedulerMetrics::inc(&self.metrics.empty_polls);
                let delay = self.backoff.next_delay();
                trace!(?delay, "scheduler: queue empty");
                offer.delay(delay);
            }
            Err(e) => {
                SchedulerMetrics::inc(&self.metrics.queue_errors);
                let delay = self.backoff.next_delay();
                error!(error = %e, ?delay, "scheduler: failed to dispatch next item");
                offer.delay(delay);
            }
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
