//! Mode selection.
//!
//! Turns a [`SyncConfig`] into a validated plan for one `start`.

use crate::config::{
    RemoteAdd, ShapeModel, SyncConfig, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
use crate::error::{SyncError, SyncResult};
use crate::store::FetchOptions;
use crate::transport::{tracing_logger, ChannelRef, PushTransport};
use livesync_protocol::PayloadFormat;
use std::sync::Arc;
use std::time::Duration;

/// How a manager keeps its store fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Channel events drive the store.
    Push,
    /// A timer re-fetches the store.
    Poll,
}

/// Returns the mode a configuration selects.
///
/// Push iff a transport or an existing channel is supplied.
pub fn select_mode(config: &SyncConfig) -> SyncMode {
    if config.is_push() {
        SyncMode::Push
    } else {
        SyncMode::Poll
    }
}

/// Where the push channel comes from.
pub(crate) enum ChannelSource {
    /// Bind on a channel the caller already holds.
    Existing(ChannelRef),
    /// Subscribe to `channel_name` through the transport.
    Subscribe(Arc<dyn PushTransport>),
}

/// Everything the channel binder needs.
pub(crate) struct PushPlan {
    pub source: ChannelSource,
    pub transport: Option<Arc<dyn PushTransport>>,
    /// Full channel name, prefix included.
    pub channel_name: String,
    pub namespace: String,
    pub format: PayloadFormat,
    pub key_field: String,
    pub shape_model: Option<ShapeModel>,
    pub apply_remote_add: Option<RemoteAdd>,
}

/// Everything the poll loop needs.
#[derive(Debug, Clone)]
pub(crate) struct PollPlan {
    /// `None` polls without limit.
    pub max_attempts: Option<u32>,
    pub interval: Duration,
    pub options: FetchOptions,
}

pub(crate) enum SyncPlan {
    Push(PushPlan),
    Poll(PollPlan),
}

/// Validates a configuration and resolves its defaults.
///
/// Installs the transport logger when logging is enabled.
pub(crate) fn plan(config: &SyncConfig) -> SyncResult<SyncPlan> {
    let source = match (&config.existing_channel, &config.transport) {
        (Some(channel), _) => ChannelSource::Existing(Arc::clone(channel)),
        (None, Some(transport)) => ChannelSource::Subscribe(Arc::clone(transport)),
        (None, None) => return Ok(SyncPlan::Poll(plan_poll(config))),
    };
    plan_push(config, source).map(SyncPlan::Push)
}

fn plan_push(config: &SyncConfig, source: ChannelSource) -> SyncResult<PushPlan> {
    if config.channel_name.is_empty() {
        return Err(SyncError::MissingChannelName);
    }
    if config.event_namespace.is_empty() {
        return Err(SyncError::MissingEventNamespace);
    }

    match (&config.transport, config.log_enabled) {
        (Some(transport), enabled) => transport.set_logger(enabled.then(tracing_logger)),
        (None, true) => tracing::debug!(
            channel = %config.channel_name,
            "logging requested without a transport; nothing to enable"
        ),
        (None, false) => {}
    }

    Ok(PushPlan {
        source,
        transport: config.transport.clone(),
        channel_name: config.visibility.channel_name(&config.channel_name),
        namespace: config.event_namespace.clone(),
        format: config.payload_format,
        key_field: config.key_field.clone(),
        shape_model: config.shape_model.clone(),
        apply_remote_add: config.apply_remote_add.clone(),
    })
}

fn plan_poll(config: &SyncConfig) -> PollPlan {
    let max_attempts = match config.max_poll_attempts {
        None => Some(DEFAULT_MAX_POLL_ATTEMPTS),
        Some(0) => None,
        Some(n) => Some(n),
    };
    let interval = config
        .poll_interval
        .filter(|interval| !interval.is_zero())
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    PollPlan {
        max_attempts,
        interval,
        options: config.fetch_options.clone(),
    }
}
