//! # livesync protocol
//!
//! Wire-level types shared by the livesync managers.
//!
//! This crate provides:
//! - `Record` and `RecordKey` for the JSON objects kept in sync
//! - `EventKind` and the `{kind}_{namespace}` event naming scheme
//! - `ChannelVisibility` and its channel-name prefixes
//! - `PayloadFormat` for decoding push envelopes
//! - `Notification` for the `synced:*` events emitted on local stores
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod payload;
mod record;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{ChannelVisibility, EventKind, Notification};
pub use payload::{Envelope, PayloadFormat};
pub use record::{Record, RecordKey, DEFAULT_KEY_FIELD};
