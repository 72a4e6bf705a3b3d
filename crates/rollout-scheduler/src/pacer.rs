//! The pacer task: draws permits from a [`Schedule`] and offers them to a
//! single consumer, one at a time.
//!
//! # Protocol
//!
//! Each permit becomes an [`Offer`] on the pacer's output channel. The
//! consumer answers an offer with a delay: zero to go again as soon as the
//! schedule allows, or a positive duration to make the pacer sleep first (for
//! instance to back off an empty work queue). At most one offer is in flight.
//!
//! # States
//!
//! ```text
//!   Running ──take() == Zero──▶ Draining ──stop()──▶ Stopped
//!      │                                               ▲
//!      └──────────────────stop()───────────────────────┘
//! ```
//!
//! A draining pacer never offers anything; it only waits to be stopped. Once
//! stopped the output channel is closed and [`Pacer::recv`] returns `None`
//! immediately.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_single_offer;
use crate::schedule::{Schedule, ScheduleError};
use rollout_window::RateSpec;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Where a pacer task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    /// Taking permits and offering them.
    Running,
    /// The schedule is blocked; parked until stopped.
    Draining,
    /// The task has exited and the output channel is closed.
    Stopped,
}

/// Permission to dispatch one item.
///
/// Dropping an offer without replying is the same as replying with zero.
#[derive(Debug)]
pub struct Offer {
    at: Instant,
    reply: oneshot::Sender<Duration>,
}

impl Offer {
    /// When the schedule granted this permit.
    pub fn at(&self) -> Instant {
        self.at
    }

    /// Releases the pacer to take the next permit right away.
    pub fn proceed(self) {
        self.delay(Duration::ZERO);
    }

    /// Makes the pacer sleep `delay` before taking the next permit.
    pub fn delay(self, delay: Duration) {
        // pacer may have been stopped meanwhile
        let _ = self.reply.send(delay);
    }
}

/// Handle to a running pacer task.
///
/// The handle owns the task: call [`stop`](Self::stop) to shut it down.
/// Dropping the handle also ends the task, without waiting for it.
pub struct Pacer {
    offers: mpsc::Receiver<Offer>,
    done: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<PacerState>,
    rate: RateSpec,
    valid_until: Option<Instant>,
}

impl Pacer {
    /// Spawns a pacer task for `schedule` on the current runtime.
    pub fn start(schedule: Schedule) -> Self {
        let rate = schedule.rate();
        let valid_until = schedule.valid_until();
        let (offers_tx, offers) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let (state_tx, state) = watch::channel(PacerState::Running);

        let task = tokio::spawn(run(schedule, offers_tx, done_rx, state_tx));

        Self {
            offers,
            done: Some(done_tx),
            task: Some(task),
            state,
            rate,
            valid_until,
        }
    }

    /// Waits for the next offer. `None` means this pacer is finished and will
    /// never offer again; it is not an error.
    pub async fn recv(&mut self) -> Option<Offer> {
        self.offers.recv().await
    }

    pub fn state(&self) -> PacerState {
        *self.state.borrow()
    }

    /// Waits until the task reaches `target`.
    pub async fn wait_for_state(&mut self, target: PacerState) {
        // the sender only goes away once Stopped has been published
        let _ = self.state.wait_for(|s| *s == target).await;
    }

    pub fn rate(&self) -> RateSpec {
        self.rate
    }

    pub fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }

    /// Stops the task and waits for it to exit.
    ///
    /// Unblocks the task wherever it is waiting: on the schedule, on a
    /// pending offer, on a reply, in a consumer-requested sleep, or parked in
    /// the draining state. Afterwards [`recv`](Self::recv) returns `None`.
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "pacer task failed");
            }
        }
        // discard an offer published just before the stop
        self.offers.close();
        while self.offers.try_recv().is_ok() {}
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

async fn run(
    mut schedule: Schedule,
    offers: mpsc::Sender<Offer>,
    mut done: oneshot::Receiver<()>,
    state_tx: watch::Sender<PacerState>,
) {
    let mut state = PacerState::Running;
    debug!(rate = %schedule.rate(), "pacer: running");

    while state != PacerState::Stopped {
        let next = match state {
            PacerState::Running => step(&mut schedule, &offers, &mut done).await,
            PacerState::Draining => {
                // done resolves on stop() or when the handle is dropped
                let _ = (&mut done).await;
                PacerState::Stopped
            }
            PacerState::Stopped => PacerState::Stopped,
        };
        if next != state {
            debug!(from = ?state, to = ?next, "pacer: state change");
            state = next;
            if state == PacerState::Stopped {
                // close the output channel before anyone observes Stopped
                drop(offers);
                state_tx.send_replace(state);
                break;
            }
            state_tx.send_replace(state);
        }
    }
}

/// One Running iteration. Returns the state to move to.
async fn step(
    schedule: &mut Schedule,
    offers: &mpsc::Sender<Offer>,
    done: &mut oneshot::Receiver<()>,
) -> PacerState {
    let taken = tokio::select! {
        biased;
        _ = &mut *done => return PacerState::Stopped,
        taken = schedule.take() => taken,
    };
    let at = match taken {
        Ok(at) => at,
        Err(ScheduleError::Zero) => return PacerState::Draining,
    };

    #[cfg(debug_assertions)]
    debug_assert_single_offer!(offers.max_capacity() - offers.capacity() + 1);

    let (reply_tx, reply_rx) = oneshot::channel();
    let offer = Offer {
        at,
        reply: reply_tx,
    };
    tokio::select! {
        biased;
        _ = &mut *done => return PacerState::Stopped,
        sent = offers.send(offer) => {
            if sent.is_err() {
                // receiver is gone along with the handle
                return PacerState::Stopped;
            }
        }
    }

    let delay = tokio::select! {
        biased;
        _ = &mut *done => return PacerState::Stopped,
        reply = reply_rx => reply.unwrap_or(Duration::ZERO),
    };

    if !delay.is_zero() {
        tokio::select! {
            biased;
            _ = &mut *done => return PacerState::Stopped,
            () = sleep(delay) => {}
        }
    }
    PacerState::Running
}
