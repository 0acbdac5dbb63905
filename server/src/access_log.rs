//! One structured log line per completed session, and one per notable error.
//!
//! Satisfies §4.9/§C9: enough fields to answer "who connected, to what, for how long, and how
//! many bytes" without a separate analytics system.

use std::net::SocketAddr;
use std::time::Duration;

use icy_core::log_info;

/// The kind of session an access-log line summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// A source (`SOURCE`/`PUT`) session.
    Source,
    /// A listener (`GET`) session.
    Listener,
}

impl SessionKind {
    fn as_str(self) -> &'static str {
        match self {
            SessionKind::Source => "source",
            SessionKind::Listener => "listener",
        }
    }
}

/// Emits one access-log line for a completed source or listener session.
#[allow(clippy::too_many_arguments)]
pub fn log_session_end(
    kind: SessionKind,
    mount: &str,
    peer: SocketAddr,
    bytes: u64,
    elapsed: Duration,
    metadata_requested: Option<bool>,
    reason: &str,
) {
    match metadata_requested {
        Some(requested) => log_info!(
            kind = kind.as_str(),
            mount,
            peer = %peer,
            bytes,
            elapsed_secs = elapsed.as_secs_f64(),
            metadata_requested = requested,
            reason,
            "session ended"
        ),
        None => log_info!(
            kind = kind.as_str(),
            mount,
            peer = %peer,
            bytes,
            elapsed_secs = elapsed.as_secs_f64(),
            reason,
            "session ended"
        ),
    }
}

/// Emits one access-log line for a metadata update.
pub fn log_metadata_update(mount: &str, peer: SocketAddr, title: &str) {
    log_info!(mount, peer = %peer, title, "metadata updated");
}
