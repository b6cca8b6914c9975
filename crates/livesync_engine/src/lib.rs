//! # livesync engine
//!
//! Freshness managers that keep a local collection or a single record in
//! step with the server.
//!
//! This crate provides:
//! - [`LiveCollection`] and [`LiveRecord`] managers with `start`, `stop`,
//!   `stop_and_release` and `is_active`
//! - Push mode: channel events mirrored into the store
//! - Poll mode: bounded, interval-driven re-fetch
//! - Transport, channel, store and scheduler traits with in-memory doubles
//!
//! ## Architecture
//!
//! A manager picks its mode from the [`SyncConfig`] on every `start`:
//! 1. Push if a transport or an existing channel is supplied
//! 2. Poll otherwise
//!
//! Starting always tears down the previous run first, so a manager never
//! holds more than one set of handlers or one pending timer.
//!
//! ## Key Invariants
//!
//! - A manager only ever unbinds the listeners it bound itself
//! - `stop` never releases the channel subscription; `stop_and_release` does
//! - A poll run issues at most `max_poll_attempts` re-fetches
//! - `is_active` is false after `stop` in every mode
//! - No lock is held while a handler, store method or timer runs

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binder;
mod collection;
mod config;
mod error;
mod mode;
mod poll;
mod record;
mod scheduler;
mod state;
mod store;
mod transport;

pub use collection::LiveCollection;
pub use config::{
    RemoteAdd, ShapeModel, SyncConfig, SyncSettings, DEFAULT_MAX_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL,
};
pub use error::{SyncError, SyncResult};
pub use mode::{select_mode, SyncMode};
pub use poll::PollPhase;
pub use record::LiveRecord;
pub use scheduler::{ManualScheduler, Scheduler, TimerCallback, TimerHandle, TokioScheduler};
pub use state::SyncStatus;
pub use store::{
    AddOptions, CollectionStore, FetchCallback, FetchOptions, MemoryCollection, MemoryRecord,
    NotificationHook, RecordStore,
};
pub use transport::{
    tracing_logger, Channel, ChannelRef, EventHandler, ListenerId, MemoryChannel,
    MemoryTransport, PushTransport, TransportLogger,
};

pub use livesync_protocol::{
    ChannelVisibility, Envelope, EventKind, Notification, PayloadFormat, Record, RecordKey,
};
