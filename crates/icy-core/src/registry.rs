//! Server-wide mount table and admission accounting.
//!
//! Grounded on `massive-graph-core/src/core/app_state.rs`'s `AppState` pattern (a shared,
//! `Arc`-held process-wide struct built once at startup from `Config`) and the original
//! server's `IceServer` (`server.go`), which owns the mount table and the global listener/
//! source counters this registry replicates as atomics rather than mutex-guarded integers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::buffer::PagePool;
use crate::config::Config;
use crate::error::RelayError;
use crate::log_info;
use crate::mount::Mount;

/// Server-wide admission limits and timeouts, copied out of [`Config`] at startup.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum concurrent listeners across all mounts.
    pub max_listeners: i64,
    /// Maximum concurrent sources across all mounts.
    pub max_sources: i64,
    /// Seconds of consecutive EOF reads before a source session is declared idle.
    pub source_idle_timeout_secs: u64,
    /// Seconds a listener's cursor may stall at the tail of its queue before timing out.
    pub empty_buffer_idle_timeout_secs: u64,
    /// Seconds allowed for a single write to a listener socket to complete.
    pub write_timeout_secs: u64,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_listeners: config.limits.clients as i64,
            max_sources: config.limits.sources as i64,
            source_idle_timeout_secs: config.limits.source_idle_timeout,
            empty_buffer_idle_timeout_secs: config.limits.empty_buffer_idle_timeout,
            write_timeout_secs: config.limits.write_timeout,
        }
    }
}

/// Process-wide registry: the fixed mount table plus admission counters and the running flag.
pub struct ServerState {
    mounts: HashMap<String, Arc<Mount>>,
    /// Admission limits and timeouts for this process.
    pub limits: Limits,
    listener_count: AtomicI64,
    source_count: AtomicI64,
    running: AtomicBool,
    /// Password required for the metadata-update command.
    pub admin_password: String,
}

impl ServerState {
    /// Builds the fixed mount table from `config` and a shared page pool. Mount names are
    /// immutable after this call; there is no dynamic mount creation.
    pub fn new(config: &Config, pool: Arc<PagePool>) -> Result<Self, RelayError> {
        config.validate()?;
        let mut mounts = HashMap::with_capacity(config.mounts.len());
        for mount_config in &config.mounts {
            let mount = Mount::init(mount_config, &config.host, config.socket.port, pool.clone())?;
            log_info!(mount = %mount_config.name, "mount initialized");
            mounts.insert(mount_config.name.clone(), Arc::new(mount));
        }
        Ok(Self {
            mounts,
            limits: Limits::from(config),
            listener_count: AtomicI64::new(0),
            source_count: AtomicI64::new(0),
            running: AtomicBool::new(true),
            admin_password: config.auth.admin_password.clone(),
        })
    }

    /// Looks up a mount by name; mounts never change identity after startup.
    pub fn mount(&self, name: &str) -> Option<Arc<Mount>> {
        self.mounts.get(name).cloned()
    }

    /// All configured mount names, for status reporting.
    pub fn mount_names(&self) -> Vec<String> {
        self.mounts.keys().cloned().collect()
    }

    /// Attempts to admit one more listener. Returns `false` (no state changed) if the server
    /// is already at `limits.max_listeners`.
    pub fn try_admit_listener(&self) -> bool {
        try_admit(&self.listener_count, self.limits.max_listeners)
    }

    /// Releases one previously admitted listener slot.
    pub fn release_listener(&self) {
        release(&self.listener_count);
    }

    /// Attempts to admit one more source. Returns `false` if the server is already at
    /// `limits.max_sources`.
    pub fn try_admit_source(&self) -> bool {
        try_admit(&self.source_count, self.limits.max_sources)
    }

    /// Releases one previously admitted source slot.
    pub fn release_source(&self) {
        release(&self.source_count);
    }

    /// Current global listener count.
    pub fn listener_count(&self) -> i64 {
        self.listener_count.load(Ordering::Acquire)
    }

    /// Current global source count.
    pub fn source_count(&self) -> i64 {
        self.source_count.load(Ordering::Acquire)
    }

    /// Whether the server is still accepting and servicing connections.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Flips the running flag to false. In-flight loops observe this within one iteration and
    /// unwind on their own; this call does not itself close any sockets.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }
}

fn try_admit(counter: &AtomicI64, limit: i64) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            if current < limit {
                Some(current + 1)
            } else {
                None
            }
        })
        .is_ok()
}

fn release(counter: &AtomicI64) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some((current - 1).max(0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_limits(max_listeners: i64, max_sources: i64) -> ServerState {
        let mut config = Config::default();
        config.limits.clients = max_listeners as u32;
        config.limits.sources = max_sources as u32;
        ServerState::new(&config, Arc::new(PagePool::new())).unwrap()
    }

    #[test]
    fn admission_respects_limit() {
        let state = state_with_limits(2, 1);
        assert!(state.try_admit_listener());
        assert!(state.try_admit_listener());
        assert!(!state.try_admit_listener());
        state.release_listener();
        assert!(state.try_admit_listener());
    }

    #[test]
    fn release_never_goes_negative() {
        let state = state_with_limits(1, 1);
        state.release_listener();
        state.release_listener();
        assert_eq!(state.listener_count(), 0);
    }

    #[test]
    fn source_admission_independent_of_listener_admission() {
        let state = state_with_limits(5, 1);
        assert!(state.try_admit_source());
        assert!(!state.try_admit_source());
        assert!(state.try_admit_listener());
    }

    #[test]
    fn mount_lookup_by_name() {
        let state = state_with_limits(5, 5);
        assert!(state.mount("demo").is_some());
        assert!(state.mount("missing").is_none());
    }

    #[test]
    fn shutdown_flips_running_flag() {
        let state = state_with_limits(1, 1);
        assert!(state.is_running());
        state.shutdown();
        assert!(!state.is_running());
    }
}
