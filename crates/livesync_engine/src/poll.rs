//! Poll loop.
//!
//! Re-fetches the store on a fixed interval until the attempt budget runs
//! out or the loop is stopped. Each tick hands the store its own copy of the
//! caller's fetch options.

use crate::mode::PollPlan;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::store::FetchOptions;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use uuid::Uuid;

/// Re-fetch entry point of the store being polled.
pub(crate) type FetchFn = Arc<dyn Fn(FetchOptions) + Send + Sync>;

/// Phase of the poll loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    /// Not polling.
    #[default]
    Idle,
    /// A tick is running or scheduled.
    Running,
    /// The attempt budget ran out.
    Exhausted,
}

#[derive(Default)]
struct PollState {
    phase: PollPhase,
    /// Bumped on every start and stop; ticks from older runs bail out.
    generation: u64,
    attempts: u32,
    pending: Option<TimerHandle>,
    plan: Option<PollPlan>,
}

struct PollInner {
    sync_id: Uuid,
    scheduler: Arc<dyn Scheduler>,
    fetch: FetchFn,
    state: Mutex<PollState>,
}

/// Timer-driven re-fetch loop.
pub(crate) struct PollLoop {
    inner: Arc<PollInner>,
}

impl PollLoop {
    pub fn new(sync_id: Uuid, scheduler: Arc<dyn Scheduler>, fetch: FetchFn) -> Self {
        Self {
            inner: Arc::new(PollInner {
                sync_id,
                scheduler,
                fetch,
                state: Mutex::new(PollState::default()),
            }),
        }
    }

    /// Starts a fresh run, cancelling any previous one.
    ///
    /// The first attempt runs before this returns.
    pub fn start(&self, plan: PollPlan) {
        self.stop();
        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.phase = PollPhase::Running;
            state.attempts = 0;
            state.plan = Some(plan);
            state.generation
        };
        debug!(sync_id = %self.inner.sync_id, generation, "poll loop started");
        PollInner::tick(&self.inner, generation);
    }

    /// Stops the loop and cancels the pending tick. Returns true if it was running.
    pub fn stop(&self) -> bool {
        let (pending, was_running) = {
            let mut state = self.inner.state.lock();
            let was_running = state.phase == PollPhase::Running;
            state.generation += 1;
            state.phase = PollPhase::Idle;
            (state.pending.take(), was_running)
        };
        if let Some(handle) = pending {
            self.inner.scheduler.cancel(handle);
        }
        if was_running {
            debug!(sync_id = %self.inner.sync_id, "poll loop stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().phase == PollPhase::Running
    }

    pub fn phase(&self) -> PollPhase {
        self.inner.state.lock().phase
    }

    pub fn attempts(&self) -> u32 {
        self.inner.state.lock().attempts
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PollInner {
    fn tick(this: &Arc<Self>, generation: u64) {
        let (attempt, options) = {
            let mut state = this.state.lock();
            if state.generation != generation || state.phase != PollPhase::Running {
                return;
            }
            state.pending = None;
            let Some(plan) = &state.plan else {
                return;
            };
            if plan.max_attempts.is_some_and(|max| state.attempts >= max) {
                state.phase = PollPhase::Exhausted;
                return;
            }
            let options = plan.options.clone();
            state.attempts += 1;
            (state.attempts, options)
        };

        trace!(sync_id = %this.sync_id, attempt, "poll tick");
        (this.fetch)(options);

        let interval = {
            let mut state = this.state.lock();
            // The fetch may have stopped or restarted the loop.
            if state.generation != generation || state.phase != PollPhase::Running {
                return;
            }
            let Some(plan) = &state.plan else {
                return;
            };
            if plan.max_attempts.is_some_and(|max| state.attempts >= max) {
                state.phase = PollPhase::Exhausted;
                debug!(sync_id = %this.sync_id, attempts = state.attempts, "poll attempts exhausted");
                return;
            }
            plan.interval
        };

        let weak: Weak<Self> = Arc::downgrade(this);
        let handle = this.scheduler.schedule(
            interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    PollInner::tick(&inner, generation);
                }
            }),
        );

        let stale = {
            let mut state = this.state.lock();
            if state.generation == generation && state.phase == PollPhase::Running {
                state.pending = Some(handle);
                false
            } else {
                true
            }
        };
        if stale {
            this.scheduler.cancel(handle);
        }
    }
}
