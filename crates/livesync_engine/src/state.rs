//! Lifecycle state shared by the live collection and live record managers.

use crate::binder::ChannelBinding;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::mode::{self, ChannelSource, PushPlan, SyncMode, SyncPlan};
use crate::poll::{FetchFn, PollLoop, PollPhase};
use crate::scheduler::Scheduler;
use crate::store::FetchOptions;
use crate::transport::{ChannelRef, PushTransport};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The store side of a manager: how to bind it to a channel and how to
/// re-fetch it.
pub(crate) trait SyncTarget: Send + Sync + 'static {
    /// Binds this target's handlers on `channel`.
    fn bind(&self, sync_id: Uuid, channel: ChannelRef, plan: &PushPlan) -> ChannelBinding;

    /// Re-fetches the backing data.
    fn fetch(&self, options: FetchOptions);
}

/// A point-in-time view of a manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Mode of the current or last run; `None` before the first start.
    pub mode: Option<SyncMode>,
    /// Whether handlers are bound or a poll tick is running or scheduled.
    pub active: bool,
    /// Phase of the poll loop.
    pub poll_phase: PollPhase,
    /// Re-fetches issued by the current poll run.
    pub poll_attempts_made: u32,
    /// Name of the channel last bound, kept after `stop`.
    pub channel: Option<String>,
}

/// Mutable state of one manager.
#[derive(Default)]
struct SyncState {
    mode: Option<SyncMode>,
    active: bool,
    channel: Option<ChannelRef>,
    transport: Option<Arc<dyn PushTransport>>,
    binding: Option<ChannelBinding>,
}

/// Drives one store through start/stop in either mode.
pub(crate) struct SyncController<T: SyncTarget> {
    id: Uuid,
    target: Arc<T>,
    poll: PollLoop,
    state: Mutex<SyncState>,
}

impl<T: SyncTarget> SyncController<T> {
    pub fn new(target: T, scheduler: Arc<dyn Scheduler>) -> Self {
        let id = Uuid::new_v4();
        let target = Arc::new(target);
        let fetch: FetchFn = {
            let target = Arc::clone(&target);
            Arc::new(move |options: FetchOptions| target.fetch(options))
        };
        Self {
            id,
            target,
            poll: PollLoop::new(id, scheduler, fetch),
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Tears down any previous run, then arms push or poll mode.
    ///
    /// Configuration errors are reported before anything is torn down.
    pub fn start(&self, config: &mut SyncConfig) -> SyncResult<Option<ChannelRef>> {
        let plan = mode::plan(config)?;
        self.stop();

        match plan {
            SyncPlan::Push(plan) => self.start_push(config, plan).map(Some),
            SyncPlan::Poll(plan) => {
                {
                    // Poll runs own no channel.
                    let mut state = self.state.lock();
                    state.mode = Some(SyncMode::Poll);
                    state.channel = None;
                    state.transport = None;
                }
                info!(
                    sync_id = %self.id,
                    mode = "poll",
                    max_attempts = ?plan.max_attempts,
                    interval_ms = plan.interval.as_millis() as u64,
                    "sync started"
                );
                self.poll.start(plan);
                Ok(None)
            }
        }
    }

    fn start_push(&self, config: &mut SyncConfig, plan: PushPlan) -> SyncResult<ChannelRef> {
        let channel = match (&plan.source, &plan.transport) {
            (ChannelSource::Existing(channel), Some(transport)) if !channel.is_subscribed() => {
                debug!(
                    sync_id = %self.id,
                    channel = channel.name(),
                    "existing channel was released; subscribing again"
                );
                let channel = transport.subscribe(&plan.channel_name)?;
                config.existing_channel = Some(Arc::clone(&channel));
                channel
            }
            (ChannelSource::Existing(channel), _) => Arc::clone(channel),
            (ChannelSource::Subscribe(transport), _) => {
                let channel = transport.subscribe(&plan.channel_name)?;
                config.existing_channel = Some(Arc::clone(&channel));
                channel
            }
        };

        let binding = self.target.bind(self.id, Arc::clone(&channel), &plan);
        info!(
            sync_id = %self.id,
            mode = "push",
            channel = channel.name(),
            events = ?binding.event_names(),
            "sync started"
        );

        let previous = {
            let mut state = self.state.lock();
            state.mode = Some(SyncMode::Push);
            state.active = true;
            state.channel = Some(Arc::clone(&channel));
            state.transport = plan.transport.clone();
            state.binding.replace(binding)
        };
        if let Some(previous) = previous {
            previous.unbind();
        }
        Ok(channel)
    }

    /// Unbinds this manager's handlers and cancels its timer.
    ///
    /// Leaves the channel subscription alive. Safe before any start and from
    /// inside a handler.
    pub fn stop(&self) -> Option<ChannelRef> {
        let (binding, channel) = {
            let mut state = self.state.lock();
            state.active = false;
            (state.binding.take(), state.channel.clone())
        };

        if let Some(binding) = binding {
            let unbound = binding.unbind();
            debug!(sync_id = %self.id, channel = ?channel.as_ref().map(|c| c.name().to_string()), unbound, "handlers unbound");
        }
        self.poll.stop();
        channel
    }

    /// Stops, then unsubscribes the channel through the transport.
    ///
    /// Only call this when no other manager shares the channel.
    pub fn stop_and_release(&self) -> Option<ChannelRef> {
        self.stop();
        let (channel, transport) = {
            let mut state = self.state.lock();
            (state.channel.take(), state.transport.clone())
        };

        let channel = channel?;
        match transport {
            Some(transport) => {
                if let Err(error) = transport.unsubscribe(channel.name()) {
                    warn!(sync_id = %self.id, channel = channel.name(), %error, "failed to release channel");
                } else {
                    debug!(sync_id = %self.id, channel = channel.name(), "channel released");
                }
            }
            None => debug!(
                sync_id = %self.id,
                channel = channel.name(),
                "no transport to release the channel through"
            ),
        }
        Some(channel)
    }

    pub fn is_active(&self) -> bool {
        let push_active = self.state.lock().active;
        push_active || self.poll.is_running()
    }

    pub fn status(&self) -> SyncStatus {
        let (mode, push_active, channel) = {
            let state = self.state.lock();
            (
                state.mode,
                state.active,
                state.channel.as_ref().map(|c| c.name().to_string()),
            )
        };
        SyncStatus {
            mode,
            active: push_active || self.poll.is_running(),
            poll_phase: self.poll.phase(),
            poll_attempts_made: self.poll.attempts(),
            channel,
        }
    }
}

impl<T: SyncTarget> Drop for SyncController<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{self, RemoteApplier};
    use crate::error::SyncError;
    use crate::scheduler::ManualScheduler;
    use crate::transport::{MemoryChannel, MemoryTransport};
    use livesync_protocol::{ChannelVisibility, EventKind};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        applied: AtomicUsize,
        fetched: AtomicUsize,
    }

    struct CountingApplier(Arc<Counting>);

    impl RemoteApplier for CountingApplier {
        fn events(&self) -> &'static [EventKind] {
            EventKind::for_record()
        }

        fn apply(&self, _kind: EventKind, _payload: &Value) -> SyncResult<()> {
            self.0.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Target(Arc<Counting>);

    impl SyncTarget for Target {
        fn bind(&self, _sync_id: Uuid, channel: ChannelRef, plan: &PushPlan) -> ChannelBinding {
            binder::bind(
                channel,
                &plan.namespace,
                Arc::new(CountingApplier(Arc::clone(&self.0))),
            )
        }

        fn fetch(&self, _options: FetchOptions) {
            self.0.fetched.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (SyncController<Target>, Arc<Counting>, Arc<ManualScheduler>) {
        let counts = Arc::new(Counting::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let dyn_scheduler: Arc<dyn Scheduler> = scheduler.clone();
        (
            SyncController::new(Target(Arc::clone(&counts)), dyn_scheduler),
            counts,
            scheduler,
        )
    }

    #[test]
    fn fresh_controller_is_idle() {
        let (controller, _counts, _scheduler) = controller();
        let status = controller.status();
        assert_eq!(status.mode, None);
        assert!(!status.active);
        assert_eq!(status.poll_phase, PollPhase::Idle);
        assert!(controller.stop().is_none());
        assert!(controller.stop_and_release().is_none());
    }

    #[test]
    fn push_start_subscribes_and_writes_back() {
        let (controller, counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        let mut config = SyncConfig::push(transport.clone(), "tasks", "task")
            .with_visibility(ChannelVisibility::Private);

        let channel = controller.start(&mut config).unwrap().unwrap();
        assert_eq!(channel.name(), "private-tasks");
        assert!(config.existing_channel().is_some());
        assert!(controller.is_active());
        assert_eq!(controller.status().mode, Some(SyncMode::Push));

        transport
            .emit("private-tasks", "update_task", &json!({}))
            .unwrap();
        assert_eq!(counts.applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_keeps_one_handler_set() {
        let (controller, _counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        let mut config = SyncConfig::push(transport.clone(), "tasks", "task");

        controller.start(&mut config).unwrap();
        controller.start(&mut config).unwrap();

        let channel = transport.channel("tasks").unwrap();
        assert_eq!(channel.listener_count("add_task"), 1);
        assert_eq!(channel.total_listeners(), 3);
        assert_eq!(transport.subscribe_calls(), 1);
    }

    #[test]
    fn invalid_restart_keeps_previous_run() {
        let (controller, _counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        let mut config = SyncConfig::push(transport.clone(), "tasks", "task");
        controller.start(&mut config).unwrap();

        let mut broken = SyncConfig::push(transport, "tasks", "");
        let error = controller.start(&mut broken).unwrap_err();
        assert!(matches!(error, SyncError::MissingEventNamespace));
        assert!(controller.is_active());
    }

    #[test]
    fn stop_and_release_unsubscribes() {
        let (controller, _counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        let mut config = SyncConfig::push(transport.clone(), "tasks", "task");
        controller.start(&mut config).unwrap();

        controller.stop();
        assert!(transport.is_subscribed("tasks"));
        assert_eq!(controller.status().channel.as_deref(), Some("tasks"));

        let released = controller.stop_and_release().unwrap();
        assert_eq!(released.name(), "tasks");
        assert!(!transport.is_subscribed("tasks"));
        assert!(controller.status().channel.is_none());
    }

    #[test]
    fn release_without_transport_is_noop() {
        let (controller, _counts, _scheduler) = controller();
        let channel: ChannelRef = Arc::new(MemoryChannel::new("shared"));
        let mut config = SyncConfig::shared(Arc::clone(&channel), "task");
        controller.start(&mut config).unwrap();

        let released = controller.stop_and_release().unwrap();
        assert_eq!(released.name(), "shared");
        assert!(!controller.is_active());
    }

    #[test]
    fn poll_mode_lifecycle() {
        let (controller, counts, scheduler) = controller();
        let mut config = SyncConfig::poll()
            .with_max_poll_attempts(2)
            .with_poll_interval(Duration::from_millis(50));

        assert!(controller.start(&mut config).unwrap().is_none());
        assert!(controller.is_active());
        assert_eq!(counts.fetched.load(Ordering::SeqCst), 1);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(counts.fetched.load(Ordering::SeqCst), 2);
        let status = controller.status();
        assert!(!status.active);
        assert_eq!(status.poll_phase, PollPhase::Exhausted);
        assert_eq!(status.poll_attempts_made, 2);
    }

    #[test]
    fn switching_modes_tears_down() {
        let (controller, _counts, scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        controller.start(&mut SyncConfig::poll()).unwrap();
        assert_eq!(scheduler.pending(), 1);

        controller
            .start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
            .unwrap();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(controller.status().poll_phase, PollPhase::Idle);

        controller.start(&mut SyncConfig::poll()).unwrap();
        assert_eq!(transport.channel("tasks").unwrap().total_listeners(), 0);
    }

    #[test]
    fn drop_unbinds() {
        let (controller, _counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        controller
            .start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
            .unwrap();
        drop(controller);
        assert_eq!(transport.channel("tasks").unwrap().total_listeners(), 0);
    }

    #[test]
    fn poll_release_keeps_earlier_push_channel() {
        let (controller, _counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        controller
            .start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
            .unwrap();
        controller.start(&mut SyncConfig::poll()).unwrap();
        assert!(controller.status().channel.is_none());
        assert!(controller.stop().is_none());

        assert!(controller.stop_and_release().is_none());
        assert!(transport.is_subscribed("tasks"));
    }

    #[test]
    fn restart_after_release_subscribes_again() {
        let (controller, counts, _scheduler) = controller();
        let transport = Arc::new(MemoryTransport::new());
        let mut config = SyncConfig::push(transport.clone(), "tasks", "task");
        controller.start(&mut config).unwrap();
        controller.stop_and_release();
        assert!(!transport.is_subscribed("tasks"));

        let channel = controller.start(&mut config).unwrap().unwrap();
        assert!(channel.is_subscribed());
        assert!(transport.is_subscribed("tasks"));
        assert_eq!(transport.subscribe_calls(), 2);
        assert!(config.existing_channel().unwrap().is_subscribed());

        transport.emit("tasks", "add_task", &json!({})).unwrap();
        assert_eq!(counts.applied.load(Ordering::SeqCst), 1);
    }
}
