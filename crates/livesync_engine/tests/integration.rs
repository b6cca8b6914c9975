//! Integration tests for the live collection and live record managers.

use livesync_engine::{
    AddOptions, ChannelRef, ChannelVisibility, CollectionStore, Envelope, FetchOptions,
    LiveCollection, LiveRecord, ManualScheduler, MemoryChannel, MemoryCollection, MemoryRecord,
    MemoryTransport, Notification, PayloadFormat, PollPhase, Record, RecordKey, Scheduler,
    SyncConfig, SyncError, SyncMode, SyncResult, TokioScheduler,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

fn envelope(body: Value) -> Value {
    Envelope::wrap(&body).unwrap()
}

fn collection() -> (LiveCollection<MemoryCollection>, Arc<ManualScheduler>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Arc::new(MemoryCollection::new());
    (LiveCollection::new(store, scheduler.clone()), scheduler)
}

#[test]
fn push_add_is_synced_without_native_add() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());
    let mut config = SyncConfig::push(transport.clone(), "tasks", "task");
    live.start(&mut config).unwrap();

    transport
        .emit("tasks", "add_task", &envelope(json!({"id": 1, "title": "x"})))
        .unwrap();

    let store = live.store();
    let stored = store.get(&RecordKey::from(1)).unwrap();
    assert_eq!(stored.get("title"), Some(&json!("x")));
    assert_eq!(store.events(), vec!["synced:add"]);
    assert_eq!(store.notifications(), vec![Notification::added(stored)]);
}

#[test]
fn push_update_for_unknown_key_is_ignored() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());
    live.start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
        .unwrap();

    let result = transport.emit(
        "tasks",
        "update_task",
        &envelope(json!({"id": 99, "title": "y"})),
    );
    assert!(result.is_ok());
    assert!(live.store().is_empty());
    assert!(live.store().events().is_empty());
}

#[test]
fn empty_config_polls_five_times() {
    let (live, scheduler) = collection();
    let mut config = SyncConfig::new();
    assert!(live.start(&mut config).unwrap().is_none());
    assert_eq!(live.status().mode, Some(SyncMode::Poll));

    for _ in 0..10 {
        scheduler.advance(Duration::from_millis(5_000));
    }
    assert_eq!(live.store().fetch_count(), 5);
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(live.status().poll_phase, PollPhase::Exhausted);
    assert!(!live.is_active());
}

#[test]
fn record_update_with_other_key_is_ignored() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Arc::new(MemoryRecord::new(
        Record::new().with("id", "A").with("title", "a"),
    ));
    let live = LiveRecord::new(Arc::clone(&store), scheduler);
    let transport = Arc::new(MemoryTransport::new());
    live.start(&mut SyncConfig::push(transport.clone(), "docs", "task"))
        .unwrap();

    transport
        .emit("docs", "update_task", &envelope(json!({"id": "B", "title": "z"})))
        .unwrap();

    assert_eq!(store.snapshot().get("title"), Some(&json!("a")));
    assert!(store.notifications().is_empty());
}

/// Collection whose fetch rewrites the options it is handed.
#[derive(Default)]
struct RewritingStore {
    received: Mutex<Vec<Map<String, Value>>>,
}

impl CollectionStore for RewritingStore {
    fn add(&self, record: Record, _options: AddOptions) -> SyncResult<Option<Record>> {
        Ok(Some(record))
    }

    fn remove(&self, _key: &RecordKey) -> SyncResult<Option<Record>> {
        Ok(None)
    }

    fn reset(&self, _records: Vec<Record>) -> SyncResult<()> {
        Ok(())
    }

    fn get(&self, _key: &RecordKey) -> Option<Record> {
        None
    }

    fn merge(&self, _key: &RecordKey, _fields: &Record) -> SyncResult<Option<Record>> {
        Ok(None)
    }

    fn fetch(&self, mut options: FetchOptions) {
        self.received.lock().push(options.params.clone());

        let original = options.success.take();
        options.params.insert("rewritten".into(), json!(true));
        options.success = Some(Arc::new(move |body: &Value| {
            if let Some(original) = &original {
                original(body);
            }
        }));
        if let Some(success) = &options.success {
            success(&json!([]));
        }
    }

    fn trigger(&self, _notification: &Notification) {}
}

#[test]
fn each_poll_tick_gets_fresh_options() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Arc::new(RewritingStore::default());
    let live = LiveCollection::new(Arc::clone(&store), scheduler.clone());

    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    let options = FetchOptions::new()
        .with_param("page", 2)
        .on_success(move |_body| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let mut config = SyncConfig::poll()
        .with_max_poll_attempts(3)
        .with_poll_interval(Duration::from_millis(100))
        .with_fetch_options(options);
    live.start(&mut config).unwrap();
    scheduler.advance(Duration::from_secs(1));

    let received = store.received.lock();
    assert_eq!(received.len(), 3);
    for params in received.iter() {
        assert_eq!(params.get("page"), Some(&json!(2)));
        assert!(!params.contains_key("rewritten"));
    }
    assert_eq!(successes.load(Ordering::SeqCst), 3);
}

#[test]
fn double_start_binds_once() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());

    live.start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
        .unwrap();
    live.start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
        .unwrap();

    transport
        .emit("tasks", "add_task", &envelope(json!({"id": 1})))
        .unwrap();
    assert_eq!(live.store().event_count("synced:add"), 1);
    assert_eq!(transport.channel("tasks").unwrap().total_listeners(), 4);
}

#[test]
fn stop_before_start_and_twice() {
    let (live, _scheduler) = collection();
    assert!(live.stop().is_none());
    assert!(live.stop().is_none());
    assert!(live.stop_and_release().is_none());
    assert!(!live.is_active());
}

#[test]
fn stop_always_deactivates() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());

    live.start(&mut SyncConfig::poll()).unwrap();
    live.stop();
    assert!(!live.is_active());

    live.start(&mut SyncConfig::push(transport, "tasks", "task"))
        .unwrap();
    assert!(live.is_active());
    live.stop();
    assert!(!live.is_active());
}

#[test]
fn shared_channel_survives_peer_stop() {
    let scheduler: Arc<dyn Scheduler> = Arc::new(ManualScheduler::new());
    let transport = Arc::new(MemoryTransport::new());
    let first = LiveCollection::new(Arc::new(MemoryCollection::new()), Arc::clone(&scheduler));
    let second = LiveCollection::new(Arc::new(MemoryCollection::new()), scheduler);

    let mut config = SyncConfig::push(transport.clone(), "tasks", "task");
    let channel = first.start(&mut config).unwrap().unwrap();
    let shared = second.start(&mut config).unwrap().unwrap();
    assert!(Arc::ptr_eq(&channel, &shared));
    assert_eq!(transport.subscribe_calls(), 1);

    first.stop();
    transport
        .emit("tasks", "add_task", &envelope(json!({"id": 5})))
        .unwrap();

    assert!(first.store().is_empty());
    assert_eq!(second.store().len(), 1);
    assert!(transport.is_subscribed("tasks"));
}

#[test]
fn stop_from_inside_a_handler() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Arc::new(MemoryCollection::new());
    let live = Arc::new(LiveCollection::new(Arc::clone(&store), scheduler));

    let slot: Arc<Mutex<Weak<LiveCollection<MemoryCollection>>>> =
        Arc::new(Mutex::new(Weak::new()));
    *slot.lock() = Arc::downgrade(&live);
    let hook_slot = Arc::clone(&slot);
    store.on_notification(move |_notification| {
        let live = hook_slot.lock().upgrade();
        if let Some(live) = live {
            live.stop();
        }
    });

    let transport = Arc::new(MemoryTransport::new());
    live.start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
        .unwrap();

    transport
        .emit("tasks", "add_task", &envelope(json!({"id": 1})))
        .unwrap();
    assert!(!live.is_active());

    transport
        .emit("tasks", "add_task", &envelope(json!({"id": 2})))
        .unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.event_count("synced:add"), 1);
}

#[test]
fn switching_to_poll_then_releasing_spares_peer() {
    let scheduler: Arc<dyn Scheduler> = Arc::new(ManualScheduler::new());
    let transport = Arc::new(MemoryTransport::new());
    let first = LiveCollection::new(Arc::new(MemoryCollection::new()), Arc::clone(&scheduler));
    let second = LiveCollection::new(Arc::new(MemoryCollection::new()), scheduler);

    let mut config = SyncConfig::push(transport.clone(), "tasks", "task");
    first.start(&mut config).unwrap();
    second.start(&mut config).unwrap();

    first.start(&mut SyncConfig::poll()).unwrap();
    assert!(first.stop_and_release().is_none());
    assert!(transport.is_subscribed("tasks"));

    transport
        .emit("tasks", "add_task", &envelope(json!({"id": 1})))
        .unwrap();
    assert_eq!(second.store().len(), 1);
}

#[test]
fn restart_with_same_config_after_release() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());
    let mut config = SyncConfig::push(transport.clone(), "tasks", "task");

    live.start(&mut config).unwrap();
    live.stop_and_release();
    live.start(&mut config).unwrap();
    assert!(live.is_active());
    assert!(transport.is_subscribed("tasks"));

    let delivered = transport
        .emit("tasks", "add_task", &envelope(json!({"id": 1})))
        .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(live.store().len(), 1);
}

#[test]
fn private_channel_release() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());
    let mut config = SyncConfig::push(transport.clone(), "tasks", "task")
        .with_visibility(ChannelVisibility::Presence)
        .with_logging(true);

    let channel = live.start(&mut config).unwrap().unwrap();
    assert_eq!(channel.name(), "presence-tasks");
    assert!(transport.has_logger());
    assert!(config.existing_channel().is_some());

    let released = live.stop_and_release().unwrap();
    assert_eq!(released.name(), "presence-tasks");
    assert!(!transport.is_subscribed("presence-tasks"));
}

#[test]
fn missing_namespace_fails_fast() {
    let (live, scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());
    let mut config = SyncConfig::new()
        .with_transport(transport.clone())
        .with_channel_name("tasks");

    let error = live.start(&mut config).unwrap_err();
    assert!(matches!(error, SyncError::MissingEventNamespace));
    assert!(error.is_config_error());
    assert!(!live.is_active());
    assert_eq!(transport.subscribe_calls(), 0);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn malformed_envelope_surfaces_to_transport() {
    let (live, _scheduler) = collection();
    let transport = Arc::new(MemoryTransport::new());
    live.start(&mut SyncConfig::push(transport.clone(), "tasks", "task"))
        .unwrap();

    let error = transport
        .emit("tasks", "add_task", &json!({"message": "not json"}))
        .unwrap_err();
    assert!(matches!(error, SyncError::Protocol(_)));
    assert!(live.store().is_empty());
}

#[test]
fn raw_reset_with_shaping() {
    let (live, _scheduler) = collection();
    let channel = Arc::new(MemoryChannel::new("board"));
    let channel_ref: ChannelRef = channel.clone();
    let mut config = SyncConfig::shared(channel_ref, "card")
        .with_payload_format(PayloadFormat::Raw)
        .with_shape_model(|raw: Value| {
            raw.get("cards")
                .and_then(Value::as_array)
                .map(|cards| {
                    cards
                        .iter()
                        .filter_map(|card| Record::try_from(card.clone()).ok())
                        .collect()
                })
                .unwrap_or_default()
        });
    live.start(&mut config).unwrap();

    channel
        .emit("reset_card", &json!({"cards": [{"id": "c1"}, {"id": "c2"}]}))
        .unwrap();
    assert_eq!(live.store().len(), 2);
    assert_eq!(live.store().event_count("synced:reset"), 1);
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_drives_polling() {
    let scheduler = Arc::new(TokioScheduler::current().unwrap());
    let store = Arc::new(MemoryCollection::new());
    let live = LiveCollection::new(Arc::clone(&store), scheduler);

    let mut config = SyncConfig::poll()
        .with_max_poll_attempts(3)
        .with_poll_interval(Duration::from_secs(2));
    live.start(&mut config).unwrap();
    assert_eq!(store.fetch_count(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.fetch_count(), 3);
    assert!(!live.is_active());
}
