//! Configuration for sync managers.

use crate::error::SyncResult;
use crate::store::{AddOptions, FetchOptions};
use crate::transport::{ChannelRef, PushTransport};
use livesync_protocol::{ChannelVisibility, PayloadFormat, Record, DEFAULT_KEY_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Poll attempts made when none are configured.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 5;

/// Delay between poll attempts when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Hook turning a decoded payload into the records to apply.
///
/// Adds and updates use the first record returned; resets use all of them.
pub type ShapeModel = Arc<dyn Fn(Value) -> Vec<Record> + Send + Sync>;

/// Hook replacing the default insert for remote adds (paged insertion, for
/// instance). Returns the record as stored, if known.
pub type RemoteAdd = Arc<dyn Fn(Record, AddOptions) -> SyncResult<Option<Record>> + Send + Sync>;

/// Configuration for one `start` of a sync manager.
///
/// Supplying a transport or an existing channel selects push mode; otherwise
/// the manager polls.
#[derive(Clone)]
pub struct SyncConfig {
    /// Push transport used to subscribe and release channels.
    pub transport: Option<Arc<dyn PushTransport>>,
    /// Already subscribed channel to bind on instead of subscribing.
    ///
    /// Filled in by `start` when it subscribes, so the config can be handed
    /// to further managers sharing the channel.
    pub existing_channel: Option<ChannelRef>,
    /// Channel name without visibility prefix.
    pub channel_name: String,
    /// Suffix of the `{kind}_{namespace}` event names.
    pub event_namespace: String,
    /// Channel visibility, mapped to a name prefix.
    pub visibility: ChannelVisibility,
    /// Poll attempts before the loop stops. `None` uses the default, `Some(0)`
    /// polls without limit.
    pub max_poll_attempts: Option<u32>,
    /// Delay between poll attempts. `None` uses the default.
    pub poll_interval: Option<Duration>,
    /// Optional payload shaping hook.
    pub shape_model: Option<ShapeModel>,
    /// Optional remote add override (collections only).
    pub apply_remote_add: Option<RemoteAdd>,
    /// How push payloads carry their body.
    pub payload_format: PayloadFormat,
    /// Field holding record keys.
    pub key_field: String,
    /// Options cloned into every poll fetch.
    pub fetch_options: FetchOptions,
    /// Forward the transport's diagnostics to `tracing`.
    pub log_enabled: bool,
}

impl SyncConfig {
    /// Creates an empty configuration, which selects poll mode.
    pub fn new() -> Self {
        Self {
            transport: None,
            existing_channel: None,
            channel_name: String::new(),
            event_namespace: String::new(),
            visibility: ChannelVisibility::default(),
            max_poll_attempts: None,
            poll_interval: None,
            shape_model: None,
            apply_remote_add: None,
            payload_format: PayloadFormat::default(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
            fetch_options: FetchOptions::default(),
            log_enabled: false,
        }
    }

    /// Creates a poll-mode configuration with default attempts and interval.
    pub fn poll() -> Self {
        Self::new()
    }

    /// Creates a push-mode configuration subscribing through `transport`.
    pub fn push(
        transport: Arc<dyn PushTransport>,
        channel_name: impl Into<String>,
        event_namespace: impl Into<String>,
    ) -> Self {
        Self::new()
            .with_transport(transport)
            .with_channel_name(channel_name)
            .with_event_namespace(event_namespace)
    }

    /// Creates a push-mode configuration binding on an existing channel.
    pub fn shared(channel: ChannelRef, event_namespace: impl Into<String>) -> Self {
        let channel_name = channel.name().to_string();
        Self::new()
            .with_existing_channel(channel)
            .with_channel_name(channel_name)
            .with_event_namespace(event_namespace)
    }

    /// Sets the push transport.
    pub fn with_transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets an existing channel to bind on.
    pub fn with_existing_channel(mut self, channel: ChannelRef) -> Self {
        self.existing_channel = Some(channel);
        self
    }

    /// Sets the channel name.
    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// Sets the event namespace.
    pub fn with_event_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.event_namespace = namespace.into();
        self
    }

    /// Sets the channel visibility.
    pub fn with_visibility(mut self, visibility: ChannelVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the number of poll attempts. Zero polls without limit.
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    /// Polls until stopped.
    pub fn with_unlimited_polling(self) -> Self {
        self.with_max_poll_attempts(0)
    }

    /// Sets the delay between poll attempts.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the payload shaping hook.
    pub fn with_shape_model(
        mut self,
        shape: impl Fn(Value) -> Vec<Record> + Send + Sync + 'static,
    ) -> Self {
        self.shape_model = Some(Arc::new(shape));
        self
    }

    /// Sets the remote add override.
    pub fn with_remote_add(
        mut self,
        add: impl Fn(Record, AddOptions) -> SyncResult<Option<Record>> + Send + Sync + 'static,
    ) -> Self {
        self.apply_remote_add = Some(Arc::new(add));
        self
    }

    /// Sets the payload format.
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    /// Sets the field holding record keys.
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    /// Sets the options cloned into every poll fetch.
    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    /// Enables or disables transport diagnostics.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    /// Applies deserialized settings on top of this configuration.
    ///
    /// Settings left out keep their current value.
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        if let Some(name) = settings.channel_name {
            self.channel_name = name;
        }
        if let Some(namespace) = settings.event_namespace {
            self.event_namespace = namespace;
        }
        if let Some(attempts) = settings.max_poll_attempts {
            self.max_poll_attempts = Some(attempts);
        }
        if let Some(ms) = settings.poll_interval_ms {
            self.poll_interval = Some(Duration::from_millis(ms));
        }
        if let Some(field) = settings.key_field {
            self.key_field = field;
        }
        self.visibility = settings.channel_visibility;
        self.payload_format = settings.payload_format;
        self.log_enabled = settings.log;
        self
    }

    /// Returns the channel handle written back by a push `start`.
    pub fn existing_channel(&self) -> Option<&ChannelRef> {
        self.existing_channel.as_ref()
    }

    /// Returns true if this configuration selects push mode.
    pub fn is_push(&self) -> bool {
        self.transport.is_some() || self.existing_channel.is_some()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("transport", &self.transport.is_some())
            .field(
                "existing_channel",
                &self.existing_channel.as_ref().map(|c| c.name().to_string()),
            )
            .field("channel_name", &self.channel_name)
            .field("event_namespace", &self.event_namespace)
            .field("visibility", &self.visibility)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("poll_interval", &self.poll_interval)
            .field("shape_model", &self.shape_model.is_some())
            .field("apply_remote_add", &self.apply_remote_add.is_some())
            .field("payload_format", &self.payload_format)
            .field("key_field", &self.key_field)
            .field("fetch_options", &self.fetch_options)
            .field("log_enabled", &self.log_enabled)
            .finish()
    }
}

/// The serializable part of a [`SyncConfig`].
///
/// ```
/// use livesync_engine::SyncSettings;
///
/// let settings = SyncSettings::from_json(
///     r#"{"channel_name": "tasks", "event_namespace": "task", "channel_visibility": "private"}"#,
/// )
/// .unwrap();
/// assert_eq!(settings.channel_name.as_deref(), Some("tasks"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Channel name without visibility prefix.
    pub channel_name: Option<String>,
    /// Event namespace.
    pub event_namespace: Option<String>,
    /// Channel visibility.
    pub channel_visibility: ChannelVisibility,
    /// Poll attempts; zero polls without limit.
    pub max_poll_attempts: Option<u32>,
    /// Delay between poll attempts in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Payload format.
    pub payload_format: PayloadFormat,
    /// Field holding record keys.
    pub key_field: Option<String>,
    /// Forward transport diagnostics to `tracing`.
    pub log: bool,
}

impl SyncSettings {
    /// Parses settings from JSON.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
