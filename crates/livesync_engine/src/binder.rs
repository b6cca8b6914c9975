//! Channel binding for push mode.
//!
//! Binds one handler per remote event and translates each delivery into a
//! store mutation followed by a `synced:*` notification.

use crate::config::{RemoteAdd, ShapeModel};
use crate::error::SyncResult;
use crate::mode::PushPlan;
use crate::store::{AddOptions, CollectionStore, RecordStore};
use crate::transport::{ChannelRef, EventHandler, ListenerId};
use livesync_protocol::{EventKind, Notification, PayloadFormat, Record};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Applies decoded remote events to a local store.
pub(crate) trait RemoteApplier: Send + Sync + 'static {
    /// Events this applier listens for.
    fn events(&self) -> &'static [EventKind];

    /// Applies one delivery.
    fn apply(&self, kind: EventKind, payload: &Value) -> SyncResult<()>;
}

/// The listeners one manager bound on a channel.
pub(crate) struct ChannelBinding {
    channel: ChannelRef,
    listeners: Vec<(String, ListenerId)>,
    armed: Arc<AtomicBool>,
}

impl ChannelBinding {
    pub fn event_names(&self) -> Vec<String> {
        self.listeners.iter().map(|(event, _)| event.clone()).collect()
    }

    /// Unbinds exactly the listeners this binding added.
    ///
    /// Deliveries already in flight see the binding disarmed and do nothing.
    pub fn unbind(self) -> usize {
        self.armed.store(false, Ordering::SeqCst);
        self.listeners
            .iter()
            .filter(|(event, id)| self.channel.unbind(event, *id))
            .count()
    }
}

/// Binds every event of `applier` on `channel`.
pub(crate) fn bind<A: RemoteApplier>(
    channel: ChannelRef,
    namespace: &str,
    applier: Arc<A>,
) -> ChannelBinding {
    let armed = Arc::new(AtomicBool::new(true));
    let mut listeners = Vec::new();

    for &kind in applier.events() {
        let event = kind.event_name(namespace);
        let handler: EventHandler = {
            let applier = Arc::clone(&applier);
            let armed = Arc::clone(&armed);
            Arc::new(move |payload: &Value| -> SyncResult<()> {
                if !armed.load(Ordering::SeqCst) {
                    return Ok(());
                }
                applier.apply(kind, payload)
            })
        };
        let id = channel.bind(&event, handler);
        listeners.push((event, id));
    }

    ChannelBinding {
        channel,
        listeners,
        armed,
    }
}

/// Payload decoding shared by both appliers.
struct Decoder {
    format: PayloadFormat,
    shape_model: Option<ShapeModel>,
}

impl Decoder {
    fn from_plan(plan: &PushPlan) -> Self {
        Self {
            format: plan.format,
            shape_model: plan.shape_model.clone(),
        }
    }

    /// Decodes and shapes a single record. `None` when shaping yields nothing.
    fn one(&self, payload: &Value) -> SyncResult<Option<Record>> {
        match &self.shape_model {
            Some(shape) => Ok(shape(self.format.decode(payload)?).into_iter().next()),
            None => Ok(Some(self.format.decode_record(payload)?)),
        }
    }

    fn many(&self, payload: &Value) -> SyncResult<Vec<Record>> {
        match &self.shape_model {
            Some(shape) => Ok(shape(self.format.decode(payload)?)),
            None => Ok(self.format.decode_records(payload)?),
        }
    }

    /// Decodes without shaping, for removals.
    fn unshaped(&self, payload: &Value) -> SyncResult<Record> {
        Ok(self.format.decode_record(payload)?)
    }
}

/// Keeps a collection in step with add/remove/update/reset events.
pub(crate) struct CollectionApplier<S> {
    sync_id: Uuid,
    store: Arc<S>,
    decoder: Decoder,
    key_field: String,
    remote_add: Option<RemoteAdd>,
}

impl<S: CollectionStore> CollectionApplier<S> {
    pub fn new(sync_id: Uuid, store: Arc<S>, plan: &PushPlan) -> Self {
        Self {
            sync_id,
            store,
            decoder: Decoder::from_plan(plan),
            key_field: plan.key_field.clone(),
            remote_add: plan.apply_remote_add.clone(),
        }
    }

    fn on_add(&self, payload: &Value) -> SyncResult<()> {
        let Some(record) = self.decoder.one(payload)? else {
            debug!(sync_id = %self.sync_id, "shaping produced no record to add");
            return Ok(());
        };
        let key = record.key(&self.key_field);

        let stored = match &self.remote_add {
            Some(add) => add(record, AddOptions::silent())?,
            None => self.store.add(record, AddOptions::silent())?,
        };

        // Notify with the record as the store holds it.
        let inserted = match key {
            Some(key) => self.store.get(&key),
            None => stored,
        };
        if let Some(record) = inserted {
            self.store.trigger(&Notification::added(record));
        }
        Ok(())
    }

    fn on_remove(&self, payload: &Value) -> SyncResult<()> {
        let record = self.decoder.unshaped(payload)?;
        let Some(key) = record.key(&self.key_field) else {
            return Ok(());
        };
        if let Some(removed) = self.store.remove(&key)? {
            self.store.trigger(&Notification::removed(removed));
        }
        Ok(())
    }

    fn on_update(&self, payload: &Value) -> SyncResult<()> {
        let Some(record) = self.decoder.one(payload)? else {
            return Ok(());
        };
        let Some(key) = record.key(&self.key_field) else {
            return Ok(());
        };
        match self.store.merge(&key, &record)? {
            Some(merged) => self.store.trigger(&Notification::updated(merged)),
            None => debug!(sync_id = %self.sync_id, %key, "ignoring update for unknown record"),
        }
        Ok(())
    }

    fn on_reset(&self, payload: &Value) -> SyncResult<()> {
        let records = self.decoder.many(payload)?;
        self.store.reset(records.clone())?;
        self.store.trigger(&Notification::reset(records));
        Ok(())
    }
}

impl<S: CollectionStore + 'static> RemoteApplier for CollectionApplier<S> {
    fn events(&self) -> &'static [EventKind] {
        EventKind::for_collection()
    }

    fn apply(&self, kind: EventKind, payload: &Value) -> SyncResult<()> {
        match kind {
            EventKind::Add => self.on_add(payload),
            EventKind::Remove => self.on_remove(payload),
            EventKind::Update => self.on_update(payload),
            EventKind::Reset => self.on_reset(payload),
        }
    }
}

/// Keeps a single record in step with events carrying its own key.
///
/// Deliveries for any other key are ignored, so several records can share
/// one channel and namespace.
pub(crate) struct RecordApplier<S> {
    sync_id: Uuid,
    store: Arc<S>,
    decoder: Decoder,
    key_field: String,
}

impl<S: RecordStore> RecordApplier<S> {
    pub fn new(sync_id: Uuid, store: Arc<S>, plan: &PushPlan) -> Self {
        Self {
            sync_id,
            store,
            decoder: Decoder::from_plan(plan),
            key_field: plan.key_field.clone(),
        }
    }

    fn is_own(&self, record: &Record) -> bool {
        let remote = record.key(&self.key_field);
        let own = remote.is_some() && remote == self.store.key(&self.key_field);
        if !own {
            debug!(
                sync_id = %self.sync_id,
                remote = ?remote,
                "ignoring event for another record"
            );
        }
        own
    }
}

impl<S: RecordStore + 'static> RemoteApplier for RecordApplier<S> {
    fn events(&self) -> &'static [EventKind] {
        EventKind::for_record()
    }

    fn apply(&self, kind: EventKind, payload: &Value) -> SyncResult<()> {
        let record = match kind {
            EventKind::Remove => Some(self.decoder.unshaped(payload)?),
            _ => self.decoder.one(payload)?,
        };
        let Some(record) = record.filter(|r| self.is_own(r)) else {
            return Ok(());
        };

        let notification = match kind {
            EventKind::Add => Notification::added(self.store.set(&record)?),
            EventKind::Update => Notification::updated(self.store.set(&record)?),
            EventKind::Remove => Notification::removed(record),
            EventKind::Reset => return Ok(()),
        };
        self.store.trigger(&notification);
        Ok(())
    }
}
