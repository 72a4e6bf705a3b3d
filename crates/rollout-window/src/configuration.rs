//! The active set of rollout windows.
//!
//! A [`Configuration`] holds an immutable snapshot of parsed windows behind a
//! read/write lock. [`Configuration::update`] builds a fresh list and swaps it
//! in; readers clone the `Arc` and never observe a half-built list.

use crate::error::{ParseErrors, WindowError};
use crate::rate::RateSpec;
use crate::window::{RawWindow, Window};
use chrono::{DateTime, Days, Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// How far ahead [`Configuration::estimate`] looks before giving up.
const ESTIMATE_HORIZON_DAYS: u64 = 7;

/// The rate in force at some instant and until when it is guaranteed to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRate {
    /// The matching window, `None` when no window matched.
    pub window: Option<Window>,
    pub rate: RateSpec,
    /// Next instant at which the active window could change. `None` only when
    /// there are no windows at all.
    pub until: Option<DateTime<Utc>>,
}

impl ActiveRate {
    /// Wall-clock time left from `now` until the boundary.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.until
            .map(|until| (until - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Ordered rollout windows shared between a configuration writer and readers.
#[derive(Debug)]
pub struct Configuration {
    windows: RwLock<Arc<[Window]>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            windows: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from raw windows, returning any parse errors
    /// alongside it. Valid windows are kept even when siblings fail.
    pub fn from_raw(raw: Option<&[RawWindow]>) -> (Self, Result<(), ParseErrors>) {
        let cfg = Self::new();
        let result = cfg.update(raw);
        (cfg, result)
    }

    /// Replaces the window list. `None` clears every window.
    ///
    /// Each entry is parsed independently: malformed entries are reported in
    /// the returned error, tagged with their index, and the remaining valid
    /// entries take effect regardless.
    pub fn update(&self, raw: Option<&[RawWindow]>) -> Result<(), ParseErrors> {
        let raw = raw.unwrap_or_default();
        let mut windows = Vec::with_capacity(raw.len());
        let mut errors = Vec::new();

        for (index, entry) in raw.iter().enumerate() {
            match Window::parse(entry) {
                Ok(window) => windows.push(window),
                Err(errs) => errors.extend(errs.into_iter().map(|e| e.at(index))),
            }
        }

        debug!(
            windows = windows.len(),
            rejected = raw.len() - windows.len(),
            "Configuration::update: swapping window list"
        );
        let windows: Arc<[Window]> = windows.into();
        *self.windows.write().unwrap_or_else(PoisonError::into_inner) = windows;

        match ParseErrors::collect(errors) {
            Some(errors) => Err(errors),
            None => Ok(()),
        }
    }

    /// The current window list.
    pub fn snapshot(&self) -> Arc<[Window]> {
        let guard = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// The last declared window active at `now`, if any.
    pub fn current(&self, now: DateTime<Utc>) -> Option<Window> {
        current_in(&self.snapshot(), now)
    }

    /// Earliest instant after `now` at which the active window could change.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_boundary_in(&self.snapshot(), now)
    }

    /// The rate in force at `now` and how long it lasts.
    pub fn active(&self, now: DateTime<Utc>) -> ActiveRate {
        active_in(&self.snapshot(), now)
    }

    /// Estimates when the item at `position` in the queue (0 = next) will be
    /// dispatched, walking forward through upcoming windows.
    ///
    /// Approximate: assumes perfect pacing and a queue that never stalls.
    /// Returns `None` if the item would not go out within a week.
    pub fn estimate(&self, now: DateTime<Utc>, position: u64) -> Option<DateTime<Utc>> {
        let windows = self.snapshot();
        let horizon = now.checked_add_days(Days::new(ESTIMATE_HORIZON_DAYS))?;
        let mut at = now;
        let mut remaining = position;

        while at < horizon {
            let active = active_in(&windows, at);
            match active.rate {
                RateSpec::Unlimited => return Some(at),
                RateSpec::Blocked => {}
                RateSpec::Limited { .. } => {
                    let spacing = active.rate.spacing().unwrap_or(Duration::ZERO);
                    let fits = active
                        .remaining(at)
                        .map_or(u64::MAX, |left| active.rate.events_over(left) as u64);
                    if remaining < fits {
                        let offset = spacing.checked_mul(u32::try_from(remaining).ok()?)?;
                        return Some(at + ChronoDuration::from_std(offset).ok()?);
                    }
                    remaining -= fits;
                }
            }
            at = active.until?;
        }
        None
    }
}

fn current_in(windows: &[Window], now: DateTime<Utc>) -> Option<Window> {
    windows.iter().rev().find(|w| w.is_active(now)).copied()
}

fn active_in(windows: &[Window], now: DateTime<Utc>) -> ActiveRate {
    let window = current_in(windows, now);
    ActiveRate {
        window,
        rate: window.map_or(RateSpec::Unlimited, |w| w.rate()),
        until: next_boundary_in(windows, now),
    }
}

fn next_boundary_in(windows: &[Window], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if windows.is_empty() {
        return None;
    }

    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1))?;
    let midnight = tomorrow.and_time(NaiveTime::MIN).and_utc();

    let next_at = |time: NaiveTime| {
        let candidate = today.and_time(time).and_utc();
        if candidate > now {
            candidate
        } else {
            tomorrow.and_time(time).and_utc()
        }
    };

    let boundary = windows
        .iter()
        .filter_map(Window::range)
        .flat_map(|range| [range.start, range.end])
        .map(|time| next_at(time.as_naive()))
        .fold(midnight, std::cmp::min);
    Some(boundary)
}

/// Reports configuration problems without failing.
pub fn log_parse_errors(errors: &ParseErrors) {
    for error in errors.errors() {
        let index = match error {
            WindowError::Entry { index, .. } => Some(*index),
            _ => None,
        };
        tracing::warn!(?index, error = %error.root(), "invalid rollout window");
    }
}
