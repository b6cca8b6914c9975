//! # livesync testkit
//!
//! Test utilities for livesync.
//!
//! This crate provides:
//! - A harness wiring memory stores to a virtual clock and memory transport
//! - Property-based test generators using proptest
//! - `tracing` setup for tests
//!
//! ## Usage
//!
//! ```rust
//! use livesync_engine::SyncConfig;
//! use livesync_testkit::prelude::*;
//!
//! with_harness(|harness| {
//!     let live = harness.collection(scenarios::tasks(3));
//!     live.start(&mut SyncConfig::push(harness.transport.clone(), "tasks", "task"))
//!         .unwrap();
//!     harness.push("tasks", "remove_task", &serde_json::json!({"id": 1}));
//!     assert_eq!(live.store().len(), 2);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
