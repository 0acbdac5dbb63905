//! # ICY relay server
//!
//! The binary-side half of the relay: raw HTTP/1.0 parsing over TCP, request dispatch, and
//! the three session handlers (source ingestion, listener delivery, metadata update). Socket-
//! free state (page pool/queue, mount, config, error taxonomy) lives in `icy_core`.

#![warn(missing_docs)]

/// Minimal HTTP/1.0 request-line and header parsing over a raw socket.
pub mod http;

/// Routes an accepted connection to the right session handler.
pub mod dispatch;

/// Source ingestion, listener delivery, and metadata update session handlers.
pub mod session;

/// Structured access logging for completed sessions and metadata updates.
pub mod access_log;
