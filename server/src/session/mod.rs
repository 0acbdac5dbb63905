//! The three session handlers the dispatcher routes requests to.

use std::sync::Arc;

use icy_core::{Mount, ServerState};

pub mod listener;
pub mod metadata;
pub mod source;

/// Releases one server-wide source-admission slot on drop, so every exit path out of a
/// source session — including early returns on auth failure — releases its slot.
pub struct SourceAdmissionGuard(pub Arc<ServerState>);

impl Drop for SourceAdmissionGuard {
    fn drop(&mut self) {
        self.0.release_source();
    }
}

/// Releases one server-wide listener-admission slot, and decrements the mount's own listener
/// count, on drop.
pub struct ListenerAdmissionGuard {
    state: Arc<ServerState>,
    mount: Arc<Mount>,
}

impl ListenerAdmissionGuard {
    /// Admits one listener slot and registers it on the mount, returning a guard that undoes
    /// both on drop. Registers the mount-level count immediately so that `mount_info()` is
    /// accurate for the whole lifetime of the session, matching the server-wide counter.
    pub fn new(state: Arc<ServerState>, mount: Arc<Mount>) -> Self {
        mount.add_listener();
        Self { state, mount }
    }
}

impl Drop for ListenerAdmissionGuard {
    fn drop(&mut self) {
        self.mount.remove_listener();
        self.state.release_listener();
    }
}

/// Calls [`Mount::clear`] on drop, so a source session that ends on any path (idle timeout,
/// I/O error, or shutdown) always returns the mount to `Offline`.
pub struct MountClearGuard(pub Arc<Mount>);

impl Drop for MountClearGuard {
    fn drop(&mut self) {
        self.0.clear();
    }
}
