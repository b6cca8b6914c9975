//! Timer scheduling.
//!
//! The poll loop never sleeps itself. It asks a [`Scheduler`] to run a
//! callback after a delay and keeps the returned [`TimerHandle`] so the timer
//! can be cancelled.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Returns the raw timer number.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Runs callbacks after a delay.
pub trait Scheduler: Send + Sync {
    /// Schedules `callback` to run once after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancels a pending timer. Returns false if it already fired or was
    /// cancelled.
    fn cancel(&self, timer: TimerHandle) -> bool;
}

/// Scheduler backed by tokio tasks.
///
/// Each timer is a spawned task sleeping for the delay. Cancelling aborts the
/// task.
pub struct TokioScheduler {
    runtime: Handle,
    timers: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
    next_timer: AtomicU64,
}

impl TokioScheduler {
    /// Creates a scheduler on the runtime of the calling context.
    pub fn current() -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Scheduler(e.to_string()))?;
        Ok(Self::with_handle(runtime))
    }

    /// Creates a scheduler on a specific runtime.
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_timer: AtomicU64::new(1),
        }
    }

    /// Returns the number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_timer.fetch_add(1, Ordering::SeqCst);
        let timers = Arc::clone(&self.timers);

        // Held across the spawn so the task cannot look itself up first.
        let mut guard = self.timers.lock();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let claimed = timers.lock().remove(&id).is_some();
            if claimed {
                callback();
            }
        });
        guard.insert(id, task);

        TimerHandle(id)
    }

    fn cancel(&self, timer: TimerHandle) -> bool {
        let task = self.timers.lock().remove(&timer.0);
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.lock().drain() {
            task.abort();
        }
    }
}

/// A virtual-clock scheduler driven explicitly by the caller.
///
/// Nothing fires until [`advance`](Self::advance) or
/// [`fire_next`](Self::fire_next) is called. Timers fire in deadline order,
/// ties in scheduling order.
#[derive(Default)]
pub struct ManualScheduler {
    now: Mutex<Duration>,
    timers: Mutex<BTreeMap<(Duration, u64), TimerCallback>>,
    next_timer: AtomicU64,
}

impl ManualScheduler {
    /// Creates a scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        *self.now.lock()
    }

    /// Returns the number of pending timers.
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }

    /// Returns the deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.lock().keys().next().map(|(deadline, _)| *deadline)
    }

    /// Moves the clock forward, firing every timer that falls due.
    ///
    /// Timers scheduled by a firing callback also fire if they fall due
    /// within the window. Returns the number of timers fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;

        loop {
            let due = {
                let mut timers = self.timers.lock();
                let key = match timers.keys().next() {
                    Some(key) if key.0 <= target => *key,
                    _ => break,
                };
                timers.remove(&key).map(|callback| (key.0, callback))
            };
            if let Some((deadline, callback)) = due {
                *self.now.lock() = deadline;
                callback();
                fired += 1;
            }
        }

        *self.now.lock() = target;
        fired
    }

    /// Jumps to the earliest pending timer and fires it.
    ///
    /// Returns false if nothing was pending.
    pub fn fire_next(&self) -> bool {
        let due = {
            let mut timers = self.timers.lock();
            let key = match timers.keys().next() {
                Some(key) => *key,
                None => return false,
            };
            timers.remove(&key).map(|callback| (key.0, callback))
        };
        match due {
            Some((deadline, callback)) => {
                *self.now.lock() = deadline;
                callback();
                true
            }
            None => false,
        }
    }

    /// Fires timers one by one until none remain or `limit` have fired.
    pub fn run_until_idle(&self, limit: usize) -> usize {
        let mut fired = 0;
        while fired < limit && self.fire_next() {
            fired += 1;
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_timer.fetch_add(1, Ordering::SeqCst);
        let deadline = self.now() + delay;
        self.timers.lock().insert((deadline, id), callback);
        TimerHandle(id)
    }

    fn cancel(&self, timer: TimerHandle) -> bool {
        let mut timers = self.timers.lock();
        let key = timers.keys().find(|(_, id)| *id == timer.0).copied();
        key.and_then(|key| timers.remove(&key)).is_some()
    }
}
