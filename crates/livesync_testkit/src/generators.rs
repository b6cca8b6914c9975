//! Property-based test generators using proptest.
//!
//! Provides strategies for records, channel names and scripted push events.

use livesync_protocol::{ChannelVisibility, EventKind, Record, RecordKey};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating record keys of either kind.
pub fn record_key_strategy() -> impl Strategy<Value = RecordKey> {
    prop_oneof![
        (0i64..1_000).prop_map(RecordKey::Int),
        prop::string::string_regex("[a-z][a-z0-9-]{0,11}")
            .expect("Invalid regex")
            .prop_map(RecordKey::Text),
    ]
}

/// Strategy for generating small integer keys, so events collide often.
pub fn small_key_strategy() -> impl Strategy<Value = i64> {
    0i64..8
}

/// Strategy for generating channel names and event namespaces.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating channel visibilities.
pub fn visibility_strategy() -> impl Strategy<Value = ChannelVisibility> {
    prop_oneof![
        Just(ChannelVisibility::Public),
        Just(ChannelVisibility::Private),
        Just(ChannelVisibility::Presence),
    ]
}

/// Strategy for generating scalar field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[ -~]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ]
}

/// Strategy for generating a record keyed by `key`.
pub fn record_strategy(key: RecordKey) -> impl Strategy<Value = Record> {
    prop::collection::btree_map("[a-z]{1,8}", field_value_strategy(), 0..4).prop_map(
        move |fields| {
            let mut record = Record::new().with("id", key.to_value());
            for (name, value) in fields {
                if name != "id" {
                    record.set(name, value);
                }
            }
            record
        },
    )
}

/// A scripted push event for a collection.
#[derive(Debug, Clone)]
pub struct PushEvent {
    /// Which event is delivered.
    pub kind: EventKind,
    /// Key of the record the event targets.
    pub key: i64,
    /// Title carried by add and update events.
    pub title: String,
}

impl PushEvent {
    /// Returns the event body as the server would send it.
    pub fn body(&self) -> Value {
        match self.kind {
            EventKind::Reset => Value::Array(vec![self.record().into_value()]),
            _ => self.record().into_value(),
        }
    }

    /// Returns the record the event carries.
    pub fn record(&self) -> Record {
        Record::new()
            .with("id", self.key)
            .with("title", self.title.as_str())
    }
}

/// Strategy for generating push events.
pub fn push_event_strategy() -> impl Strategy<Value = PushEvent> {
    let kind = prop_oneof![
        4 => Just(EventKind::Add),
        2 => Just(EventKind::Remove),
        3 => Just(EventKind::Update),
        1 => Just(EventKind::Reset),
    ];
    (kind, small_key_strategy(), "[a-z]{1,6}")
        .prop_map(|(kind, key, title)| PushEvent { kind, key, title })
}

/// Strategy for generating a sequence of push events.
pub fn push_script_strategy(
    min_events: usize,
    max_events: usize,
) -> impl Strategy<Value = Vec<PushEvent>> {
    prop::collection::vec(push_event_strategy(), min_events..max_events)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
