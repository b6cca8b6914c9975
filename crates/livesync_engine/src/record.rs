//! Live record sync.

use crate::binder::{self, ChannelBinding, RecordApplier};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::mode::PushPlan;
use crate::scheduler::Scheduler;
use crate::state::{SyncController, SyncStatus, SyncTarget};
use crate::store::{FetchOptions, RecordStore};
use crate::transport::ChannelRef;
use std::sync::Arc;
use uuid::Uuid;

struct RecordTarget<S> {
    store: Arc<S>,
}

impl<S: RecordStore + 'static> SyncTarget for RecordTarget<S> {
    fn bind(&self, sync_id: Uuid, channel: ChannelRef, plan: &PushPlan) -> ChannelBinding {
        let applier = RecordApplier::new(sync_id, Arc::clone(&self.store), plan);
        binder::bind(channel, &plan.namespace, Arc::new(applier))
    }

    fn fetch(&self, options: FetchOptions) {
        self.store.fetch(options);
    }
}

/// Keeps a single [`RecordStore`] fresh from a push channel or by polling.
///
/// Push mode listens for `add_`, `remove_` and `update_` events and only
/// applies those whose key equals the record's own key, so many records can
/// share one channel.
pub struct LiveRecord<S: RecordStore + 'static> {
    store: Arc<S>,
    controller: SyncController<RecordTarget<S>>,
}

impl<S: RecordStore + 'static> LiveRecord<S> {
    /// Creates a stopped manager for `store`.
    pub fn new(store: Arc<S>, scheduler: Arc<dyn Scheduler>) -> Self {
        let target = RecordTarget {
            store: Arc::clone(&store),
        };
        Self {
            store,
            controller: SyncController::new(target, scheduler),
        }
    }

    /// Starts syncing, tearing down any previous run first.
    ///
    /// Returns the bound channel in push mode.
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

impl<S: RecordStore + 'static> std::fmt::Debug for LiveRecord<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveRecord")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}
