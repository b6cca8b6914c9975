//! Local store abstraction.
//!
//! The store is the collection or record being kept fresh. It is owned by the
//! host application; sync managers hold a shared reference and only use the
//! narrow capabilities below.

use crate::error::SyncResult;
use livesync_protocol::{Notification, Record, RecordKey, DEFAULT_KEY_FIELD};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Options for inserting a record into a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Suppress the store's own change notification.
    pub silent: bool,
}

impl AddOptions {
    /// Options for an insert that emits no native notification.
    pub const fn silent() -> Self {
        Self { silent: true }
    }
}

/// Callback attached to a fetch.
pub type FetchCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Options handed to a store's `fetch`.
///
/// Stores are free to rewrite the options they receive (wrapping the
/// callbacks, for instance). The poll loop therefore hands every fetch its
/// own clone.
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Query parameters for the remote request.
    pub params: Map<String, Value>,
    /// Called with the fetched body on success.
    pub success: Option<FetchCallback>,
    /// Called with an error body on failure.
    pub error: Option<FetchCallback>,
}

impl FetchOptions {
    /// Creates empty fetch options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the success callback.
    pub fn on_success(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.success = Some(Arc::new(callback));
        self
    }

    /// Sets the error callback.
    pub fn on_error(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("params", &self.params)
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// An ordered, keyed collection of records.
pub trait CollectionStore: Send + Sync {
    /// Inserts a record, returning it as stored.
    fn add(&self, record: Record, options: AddOptions) -> SyncResult<Option<Record>>;

    /// Removes the record with the given key, returning it.
    fn remove(&self, key: &RecordKey) -> SyncResult<Option<Record>>;

    /// Replaces the whole contents.
    fn reset(&self, records: Vec<Record>) -> SyncResult<()>;

    /// Looks up a record by key.
    fn get(&self, key: &RecordKey) -> Option<Record>;

    /// Merges fields into the record with the given key, returning the result.
    fn merge(&self, key: &RecordKey, fields: &Record) -> SyncResult<Option<Record>>;

    /// Re-fetches the backing data. Success or failure is the store's concern.
    fn fetch(&self, options: FetchOptions);

    /// Emits a notification to the store's listeners.
    fn trigger(&self, notification: &Notification);
}

/// A single keyed record.
pub trait RecordStore: Send + Sync {
    /// Returns the record's own key.
    fn key(&self, key_field: &str) -> Option<RecordKey>;

    /// Merges fields into the record, returning the result.
    fn set(&self, fields: &Record) -> SyncResult<Record>;

    /// Re-fetches the backing data. Success or failure is the store's concern.
    fn fetch(&self, options: FetchOptions);

    /// Emits a notification to the store's listeners.
    fn trigger(&self, notification: &Notification);
}

/// Hook run whenever a memory store emits a notification.
pub type NotificationHook = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Event and fetch log shared by the memory stores.
#[derive(Default)]
struct StoreLog {
    events: RwLock<Vec<String>>,
    notifications: RwLock<Vec<Notification>>,
    fetches: RwLock<Vec<FetchOptions>>,
    hook: RwLock<Option<NotificationHook>>,
}

impl StoreLog {
    fn event(&self, name: &str) {
        self.events.write().push(name.to_string());
    }

    fn notify(&self, notification: &Notification) {
        self.event(&notification.name());
        self.notifications.write().push(notification.clone());
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(notification);
        }
    }

    /// Records the options as received, then wraps the success callback the
    /// way HTTP-backed stores do, and completes the fetch with `body`.
    fn fetch(&self, mut options: FetchOptions, body: Value) {
        self.fetches.write().push(options.clone());
        self.event("sync");

        if let Some(inner) = options.success.take() {
            let wrapped: FetchCallback = Arc::new(move |response: &Value| inner(response));
            options.success = Some(wrapped);
        }
        if let Some(success) = &options.success {
            success(&body);
        }
    }
}

/// An in-memory collection for testing.
///
/// Records every native event (`add`, `remove`, `reset`, `change`, `sync`)
/// and every `synced:*` notification in arrival order.
pub struct MemoryCollection {
    key_field: String,
    records: RwLock<Vec<Record>>,
    remote: RwLock<Option<Vec<Record>>>,
    log: StoreLog,
}

impl MemoryCollection {
    /// Creates an empty collection keyed by `id`.
    pub fn new() -> Self {
        Self::with_key_field(DEFAULT_KEY_FIELD)
    }

    /// Creates an empty collection keyed by a custom field.
    pub fn with_key_field(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            records: RwLock::new(Vec::new()),
            remote: RwLock::new(None),
            log: StoreLog::default(),
        }
    }

    /// Creates a collection holding the given records.
    pub fn with_records(records: Vec<Record>) -> Self {
        let collection = Self::new();
        *collection.records.write() = records;
        collection
    }

    /// Sets the contents a fetch will load.
    pub fn set_remote(&self, records: Vec<Record>) {
        *self.remote.write() = Some(records);
    }

    /// Installs a hook run after each notification.
    pub fn on_notification(&self, hook: impl Fn(&Notification) + Send + Sync + 'static) {
        *self.log.hook.write() = Some(Arc::new(hook));
    }

    /// Returns a copy of all records in order.
    pub fn records(&self) -> Vec<Record> {
        self.records.read().clone()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns every event name emitted so far.
    pub fn events(&self) -> Vec<String> {
        self.log.events.read().clone()
    }

    /// Returns how many times an event was emitted.
    pub fn event_count(&self, name: &str) -> usize {
        self.log.events.read().iter().filter(|e| *e == name).count()
    }

    /// Returns every `synced:*` notification emitted so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.log.notifications.read().clone()
    }

    /// Returns the options of every fetch, as received.
    pub fn fetches(&self) -> Vec<FetchOptions> {
        self.log.fetches.read().clone()
    }

    /// Returns how many fetches ran.
    pub fn fetch_count(&self) -> usize {
        self.log.fetches.read().len()
    }

    fn position(&self, records: &[Record], key: &RecordKey) -> Option<usize> {
        records
            .iter()
            .position(|r| r.key(&self.key_field).as_ref() == Some(key))
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionStore for MemoryCollection {
    fn add(&self, record: Record, options: AddOptions) -> SyncResult<Option<Record>> {
        let stored = {
            let mut records = self.records.write();
            match record.key(&self.key_field) {
                Some(key) => match self.position(&records, &key) {
                    // Already present: keep the local copy.
                    Some(index) => return Ok(Some(records[index].clone())),
                    None => records.push(record.clone()),
                },
                None => records.push(record.clone()),
            }
            record
        };
        if !options.silent {
            self.log.event("add");
        }
        Ok(Some(stored))
    }

    fn remove(&self, key: &RecordKey) -> SyncResult<Option<Record>> {
        let removed = {
            let mut records = self.records.write();
            self.position(&records, key).map(|index| records.remove(index))
        };
        if removed.is_some() {
            self.log.event("remove");
        }
        Ok(removed)
    }

    fn reset(&self, records: Vec<Record>) -> SyncResult<()> {
        *self.records.write() = records;
        self.log.event("reset");
        Ok(())
    }

    fn get(&self, key: &RecordKey) -> Option<Record> {
        let records = self.records.read();
        self.position(&records, key).map(|index| records[index].clone())
    }

    fn merge(&self, key: &RecordKey, fields: &Record) -> SyncResult<Option<Record>> {
        let merged = {
            let mut records = self.records.write();
            match self.position(&records, key) {
                Some(index) => {
                    records[index].merge(fields);
                    Some(records[index].clone())
                }
                None => None,
            }
        };
        if merged.is_some() {
            self.log.event("change");
        }
        Ok(merged)
    }

    fn fetch(&self, options: FetchOptions) {
        let remote = self.remote.read().clone();
        if let Some(records) = &remote {
            *self.records.write() = records.clone();
        }
        let body = Value::Array(
            self.records()
                .into_iter()
                .map(Record::into_value)
                .collect(),
        );
        self.log.fetch(options, body);
    }

    fn trigger(&self, notification: &Notification) {
        self.log.notify(notification);
    }
}

/// An in-memory record for testing.
pub struct MemoryRecord {
    record: RwLock<Record>,
    remote: RwLock<Option<Record>>,
    log: StoreLog,
}

impl MemoryRecord {
    /// Creates a record with the given fields.
    pub fn new(record: Record) -> Self {
        Self {
            record: RwLock::new(record),
            remote: RwLock::new(None),
            log: StoreLog::default(),
        }
    }

    /// Sets the fields a fetch will load.
    pub fn set_remote(&self, record: Record) {
        *self.remote.write() = Some(record);
    }

    /// Installs a hook run after each notification.
    pub fn on_notification(&self, hook: impl Fn(&Notification) + Send + Sync + 'static) {
        *self.log.hook.write() = Some(Arc::new(hook));
    }

    /// Returns a copy of the record.
    pub fn snapshot(&self) -> Record {
        self.record.read().clone()
    }

    /// Returns every event name emitted so far.
    pub fn events(&self) -> Vec<String> {
        self.log.events.read().clone()
    }

    /// Returns every `synced:*` notification emitted so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.log.notifications.read().clone()
    }

    /// Returns the options of every fetch, as received.
    pub fn fetches(&self) -> Vec<FetchOptions> {
        self.log.fetches.read().clone()
    }

    /// Returns how many fetches ran.
    pub fn fetch_count(&self) -> usize {
        self.log.fetches.read().len()
    }
}

impl RecordStore for MemoryRecord {
    fn key(&self, key_field: &str) -> Option<RecordKey> {
        self.record.read().key(key_field)
    }

    fn set(&self, fields: &Record) -> SyncResult<Record> {
        let updated = {
            let mut record = self.record.write();
            record.merge(fields);
            record.clone()
        };
        self.log.event("change");
        Ok(updated)
    }

    fn fetch(&self, options: FetchOptions) {
        let remote = self.remote.read().clone();
        if let Some(fields) = &remote {
            self.record.write().merge(fields);
        }
        let body = self.snapshot().into_value();
        self.log.fetch(options, body);
    }

    fn trigger(&self, notification: &Notification) {
        self.log.notify(notification);
    }
}
