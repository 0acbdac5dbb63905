//! # ICY Core
//!
//! Core types and logic for the ICY/Icecast streaming relay. This crate holds
//! everything that does not need a socket: the page pool and page queue that
//! back a mount's live ring buffer, the mount state machine, ICY metadata
//! encoding, process configuration, and the server-wide admission registry.

#![warn(missing_docs)]

/// Page pool, page, and page queue — the lock-free-read ring buffer backing every mount.
pub mod buffer;

/// Per-mount state: configuration, source/listener bookkeeping, metadata block.
pub mod mount;

/// Process configuration: TOML loading, defaults, validation.
pub mod config;

/// Cross-cutting leveled logging macros backed by `tracing`.
pub mod logging;

/// The error taxonomy used across session boundaries.
pub mod error;

/// Compile-time constants shared across modules.
pub mod constants;

/// Server-wide mount table and admission counters.
pub mod registry;

pub use buffer::{Page, PagePool, PageQueue, PinGuard, QueueInfo};
pub use config::Config;
pub use error::RelayError;
pub use mount::{MetaBlock, Mount, MountInfo};
pub use registry::{Limits, ServerState};
