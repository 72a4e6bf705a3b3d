//! Where rollout window configuration comes from.

use rollout_window::RawWindow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Callback invoked whenever the configuration changes.
pub type WatchCallback = Box<dyn Fn() + Send + Sync>;

/// Supplies raw rollout windows and announces changes to them.
///
/// `None` from [`get`](Self::get) means no windows are configured.
pub trait ConfigurationSource: Send + Sync {
    /// The current raw window list.
    fn get(&self) -> Option<Vec<RawWindow>>;

    /// Registers `callback` to run after every change until the returned
    /// [`Subscription`] is dropped. The callback must not block; it is
    /// invoked on the writer's thread.
    fn watch(&self, callback: WatchCallback) -> Subscription;
}

/// Keeps a watch callback registered. Dropping it unregisters the callback.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// A subscription that runs `release` when dropped.
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release, for sources that never
    /// notify.
    pub fn detached() -> Self {
        Self { release: None }
    }

    /// Unregisters now.
    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Watchers {
    next_id: u64,
    callbacks: Vec<(u64, WatchCallback)>,
}

/// An in-process configuration store that notifies watchers on
/// [`set`](Self::set).
#[derive(Default)]
pub struct WatchedSource {
    current: Mutex<Option<Vec<RawWindow>>>,
    watchers: Arc<Mutex<Watchers>>,
}

impl WatchedSource {
    pub fn new(initial: Option<Vec<RawWindow>>) -> Self {
        Self {
            current: Mutex::new(initial),
            watchers: Arc::default(),
        }
    }

    /// Replaces the configuration and notifies every watcher.
    pub fn set(&self, windows: Option<Vec<RawWindow>>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = windows;
        let watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, callback) in &watchers.callbacks {
            callback();
        }
    }

    /// Number of live subscriptions.
    pub fn watcher_count(&self) -> usize {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }
}

impl ConfigurationSource for WatchedSource {
    fn get(&self) -> Option<Vec<RawWindow>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn watch(&self, callback: WatchCallback) -> Subscription {
        let id = {
            let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
            let id = watchers.next_id;
            watchers.next_id += 1;
            watchers.callbacks.push((id, callback));
            id
        };

        // the source may be gone before the subscription
        let watchers: Weak<Mutex<Watchers>> = Arc::downgrade(&self.watchers);
        Subscription::new(move || {
            if let Some(watchers) = watchers.upgrade() {
                watchers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .callbacks
                    .retain(|(other, _)| *other != id);
            }
        })
    }
}
