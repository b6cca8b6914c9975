//! Event naming and local notifications.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four remote events a sync target listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A record was created remotely.
    Add,
    /// A record was deleted remotely.
    Remove,
    /// A record was modified remotely.
    Update,
    /// The whole collection was replaced remotely.
    Reset,
}

impl EventKind {
    /// Events bound by collection sync.
    pub fn for_collection() -> &'static [EventKind] {
        &[
            EventKind::Add,
            EventKind::Remove,
            EventKind::Update,
            EventKind::Reset,
        ]
    }

    /// Events bound by single-record sync.
    pub fn for_record() -> &'static [EventKind] {
        &[EventKind::Add, EventKind::Remove, EventKind::Update]
    }

    /// Returns the lowercase verb for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::Update => "update",
            EventKind::Reset => "reset",
        }
    }

    /// Returns the channel event name, e.g. `add_task` for namespace `task`.
    pub fn event_name(&self, namespace: &str) -> String {
        format!("{}_{}", self.as_str(), namespace)
    }

    /// Returns the local notification name, e.g. `synced:add`.
    pub fn notification_name(&self) -> String {
        format!("synced:{}", self.as_str())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility class of a push channel.
///
/// Private and presence channels are distinguished by a name prefix that
/// the push service uses to decide on authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelVisibility {
    /// No prefix.
    #[default]
    Public,
    /// `private-` prefix.
    Private,
    /// `presence-` prefix.
    Presence,
}

impl ChannelVisibility {
    /// Returns the channel name prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelVisibility::Public => "",
            ChannelVisibility::Private => "private-",
            ChannelVisibility::Presence => "presence-",
        }
    }

    /// Returns the full channel name for a base name.
    pub fn channel_name(&self, base: &str) -> String {
        format!("{}{}", self.prefix(), base)
    }
}

/// Notification emitted on a local store after a remote change was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Which remote event was applied.
    pub kind: EventKind,
    /// The affected records. Exactly one except for resets.
    pub records: Vec<Record>,
}

impl Notification {
    /// Creates a `synced:add` notification.
    pub fn added(record: Record) -> Self {
        Self {
            kind: EventKind::Add,
            records: vec![record],
        }
    }

    /// Creates a `synced:remove` notification.
    pub fn removed(record: Record) -> Self {
        Self {
            kind: EventKind::Remove,
            records: vec![record],
        }
    }

    /// Creates a `synced:update` notification.
    pub fn updated(record: Record) -> Self {
        Self {
            kind: EventKind::Update,
            records: vec![record],
        }
    }

    /// Creates a `synced:reset` notification.
    pub fn reset(records: Vec<Record>) -> Self {
        Self {
            kind: EventKind::Reset,
            records,
        }
    }

    /// Returns the notification name.
    pub fn name(&self) -> String {
        self.kind.notification_name()
    }

    /// Returns the single affected record, if this is not a reset.
    pub fn record(&self) -> Option<&Record> {
        match self.kind {
            EventKind::Reset => None,
            _ => self.records.first(),
        }
    }
}
