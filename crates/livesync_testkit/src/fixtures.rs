//! Test fixtures and harness helpers.
//!
//! Wires memory stores to a virtual clock and an in-memory transport so a
//! test can drive push events and poll ticks deterministically.

use livesync_engine::{
    LiveCollection, LiveRecord, ManualScheduler, MemoryCollection, MemoryRecord,
    MemoryTransport, Scheduler,
};
use livesync_protocol::{Envelope, Record};
use serde_json::Value;
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Wraps `body` in a push envelope.
pub fn envelope(body: &Value) -> Value {
    Envelope::wrap(body).expect("JSON values always serialize")
}

/// A scheduler and transport shared by every manager in a test.
pub struct TestHarness {
    /// Virtual clock driving poll ticks.
    pub scheduler: Arc<ManualScheduler>,
    /// In-memory push transport.
    pub transport: Arc<MemoryTransport>,
}

impl TestHarness {
    /// Creates a harness with tracing enabled.
    pub fn new() -> Self {
        init_tracing();
        Self {
            scheduler: Arc::new(ManualScheduler::new()),
            transport: Arc::new(MemoryTransport::new()),
        }
    }

    /// Returns the scheduler as a trait object.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    /// Creates a stopped collection manager over `records`.
    pub fn collection(&self, records: Vec<Record>) -> LiveCollection<MemoryCollection> {
        let store = Arc::new(MemoryCollection::with_records(records));
        LiveCollection::new(store, self.scheduler())
    }

    /// Creates a stopped record manager over `record`.
    pub fn record(&self, record: Record) -> LiveRecord<MemoryRecord> {
        LiveRecord::new(Arc::new(MemoryRecord::new(record)), self.scheduler())
    }

    /// Delivers an enveloped event on a subscribed channel.
    ///
    /// Returns the number of handlers that ran.
    pub fn push(&self, channel: &str, event: &str, body: &Value) -> usize {
        self.transport
            .emit(channel, event, &envelope(body))
            .expect("event delivery failed")
    }

    /// Advances the virtual clock by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) -> usize {
        self.scheduler.advance(Duration::from_millis(ms))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh harness.
///
/// # Example
///
/// ```rust
/// use livesync_engine::SyncConfig;
/// use livesync_testkit::with_harness;
///
/// with_harness(|harness| {
///     let live = harness.collection(Vec::new());
///     live.start(&mut SyncConfig::poll()).unwrap();
///     assert_eq!(live.store().fetch_count(), 1);
/// });
/// ```
pub fn with_harness<F, R>(f: F) -> R
where
    F: FnOnce(&TestHarness) -> R,
{
    let harness = TestHarness::new();
    f(&harness)
}

/// Common record shapes.
pub mod scenarios {
    use super::*;

    /// A task record with an integer key.
    pub fn task(id: i64, title: &str) -> Record {
        Record::new().with("id", id).with("title", title)
    }

    /// `count` tasks keyed `1..=count`.
    pub fn tasks(count: i64) -> Vec<Record> {
        (1..=count).map(|id| task(id, &format!("task {id}"))).collect()
    }

    /// A document record with a text key.
    pub fn document(id: &str) -> Record {
        Record::new().with("id", id).with("body", "")
    }
}
