//! Live collection sync.

use crate::binder::{self, ChannelBinding, CollectionApplier};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::mode::PushPlan;
use crate::scheduler::Scheduler;
use crate::state::{SyncController, SyncStatus, SyncTarget};
use crate::store::{CollectionStore, FetchOptions};
use crate::transport::ChannelRef;
use std::sync::Arc;
use uuid::Uuid;

struct CollectionTarget<S> {
    store: Arc<S>,
}

impl<S: CollectionStore + 'static> SyncTarget for CollectionTarget<S> {
    fn bind(&self, sync_id: Uuid, channel: ChannelRef, plan: &PushPlan) -> ChannelBinding {
        let applier = CollectionApplier::new(sync_id, Arc::clone(&self.store), plan);
        binder::bind(channel, &plan.namespace, Arc::new(applier))
    }

    fn fetch(&self, options: FetchOptions) {
        self.store.fetch(options);
    }
}

/// Keeps a [`CollectionStore`] fresh from a push channel or by polling.
///
/// In push mode it listens for `add_`, `remove_`, `update_` and `reset_`
/// events in the configured namespace and mirrors them into the store,
/// emitting `synced:*` notifications. In poll mode it re-fetches the store
/// on an interval.
///
/// # Example
///
/// ```
/// use livesync_engine::{LiveCollection, ManualScheduler, MemoryCollection, SyncConfig};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryCollection::new());
/// let live = LiveCollection::new(Arc::clone(&store), Arc::new(ManualScheduler::new()));
///
/// live.start(&mut SyncConfig::poll()).unwrap();
/// assert!(live.is_active());
/// assert_eq!(store.fetch_count(), 1);
///
/// live.stop();
/// assert!(!live.is_active());
/// ```
pub struct LiveCollection<S: CollectionStore + 'static> {
    store: Arc<S>,
    controller: SyncController<CollectionTarget<S>>,
}

impl<S: CollectionStore + 'static> LiveCollection<S> {
    /// Creates a stopped manager for `store`.
    pub fn new(store: Arc<S>, scheduler: Arc<dyn Scheduler>) -> Self {
        let target = CollectionTarget {
            store: Arc::clone(&store),
        };
        Self {
            store,
            controller: SyncController::new(target, scheduler),
        }
    }

    /// Starts syncing, tearing down any previous run first.
    ///
    /// Returns the bound channel in push mode. A channel subscribed here is
    /// also written back into `config` so it can be shared.
    pub fn start(&self, config: &mut SyncConfig) -> SyncResult<Option<ChannelRef>> {
        self.controller.start(config)
    }

    /// Stops syncing, leaving the channel subscription alive.
    pub fn stop(&self) -> Option<ChannelRef> {
        self.controller.stop()
    }

    /// Stops syncing and unsubscribes the channel.
    pub fn stop_and_release(&self) -> Option<ChannelRef> {
        self.controller.stop_and_release()
    }

    /// Returns true while handlers are bound or polling continues.
    pub fn is_active(&self) -> bool {
        self.controller.is_active()
    }

    /// Returns a snapshot of the manager's state.
    pub fn status(&self) -> SyncStatus {
        self.controller.status()
    }

    /// Returns the instance id used in logs.
    pub fn id(&self) -> Uuid {
        self.controller.id()
    }

    /// Returns the store being synced.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: CollectionStore + 'static> std::fmt::Debug for LiveCollection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCollection")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}
