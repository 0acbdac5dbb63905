//! Per-mount state machine: configuration, live source flag, metadata, and page queue.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::buffer::{PagePool, PageQueue, QueueInfo};
use crate::config::MountConfig;
use crate::constants::MIN_QUEUE_PAGES_FLOOR;
use crate::error::RelayError;

use super::meta::{decode_song_text, MetaBlock};

/// Parsed `Authorization: Basic` credentials, or their absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No `Authorization` header was present at all (legacy handshake probe).
    Absent,
    /// A username/password pair was presented.
    Basic {
        /// Presented username.
        user: String,
        /// Presented password.
        password: String,
    },
}

/// Outcome of [`Mount::auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials matched.
    Ok,
    /// No `Authorization` header was presented; callers should respond with a bare 200 hello
    /// rather than treating this as a hard failure (legacy handshake-probing encoders).
    NoCredentials,
    /// Credentials were presented but did not match.
    Rejected,
}

struct DynamicState {
    started: bool,
    started_at: Option<Instant>,
    listener_count: i64,
    content_type: String,
    genre: String,
    description: String,
    stream_url: String,
    title: String,
}

/// A point-in-time snapshot of a mount's status, for admin/status reporting.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// Mount name.
    pub name: String,
    /// Current listener count.
    pub listener_count: i64,
    /// Uptime formatted as `HH:MM:SS`, or `None` if no source is currently connected.
    pub uptime: Option<String>,
    /// Shape of the backing page queue.
    pub queue: QueueInfo,
}

/// One named live channel: configuration plus all mutable live state.
pub struct Mount {
    /// Mount name, e.g. `"RockRadio96"`.
    pub name: String,
    user: String,
    password: String,
    /// Declared bit-rate in kbit/s, fixed at init from configuration. Source sessions may
    /// report a different `ice-bitrate`; that value is logged for diagnostics but never
    /// feeds back into queue geometry, since the queue and metadata stride are already sized
    /// for the configured rate and resizing them live would invalidate existing cursors.
    pub bit_rate_kbps: u32,
    /// Burst window in bytes delivered to a newly connected listener.
    pub burst_size: usize,
    /// Byte stride between ICY metadata insertions: `bit_rate_kbps * 128 * 10`.
    pub stride: usize,
    /// Per-mount listener cap, if configured in addition to the server-wide limit.
    pub max_listeners: Option<u32>,
    canonical_url: String,
    dynamic: Mutex<DynamicState>,
    meta: ArcSwap<MetaBlock>,
    /// The mount's live page queue.
    pub queue: PageQueue,
    dump: Mutex<Option<std::fs::File>>,
}

impl Mount {
    /// Validates configuration, computes derived sizing, and constructs an offline mount.
    ///
    /// `min_size = ceil(burst_size / (bit_rate_kbps * 128)) + 2`, `max_size = 8 * min_size`,
    /// `stride = bit_rate_kbps * 128 * 10`, matching the original server's `mount.Init`.
    pub fn init(
        config: &MountConfig,
        host: &str,
        port: u16,
        pool: Arc<PagePool>,
    ) -> Result<Self, RelayError> {
        if config.bit_rate == 0 {
            return Err(RelayError::Config(format!(
                "mount {}: bit_rate must be positive",
                config.name
            )));
        }
        if config.burst_size == 0 {
            return Err(RelayError::Config(format!(
                "mount {}: burst_size must be positive",
                config.name
            )));
        }

        let bytes_per_sec = config.bit_rate as usize * 128;
        let stride = bytes_per_sec * 10;
        let min_size = (config.burst_size + bytes_per_sec - 1) / bytes_per_sec + MIN_QUEUE_PAGES_FLOOR;
        let max_size = 8 * min_size;
        let page_size = bytes_per_sec;

        let dump = match &config.dump_file {
            Some(path) => Some(
                std::fs::File::create(path)
                    .map_err(|e| RelayError::Config(format!("dump file {path}: {e}")))?,
            ),
            None => None,
        };

        let canonical_url = format!("http://{host}:{port}/{}", config.name);

        Ok(Self {
            name: config.name.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            bit_rate_kbps: config.bit_rate,
            burst_size: config.burst_size,
            stride,
            max_listeners: config.max_listeners,
            canonical_url: canonical_url.clone(),
            dynamic: Mutex::new(DynamicState {
                started: false,
                started_at: None,
                listener_count: 0,
                content_type: "audio/mpeg".to_string(),
                genre: config.genre.clone(),
                description: config.description.clone(),
                stream_url: canonical_url,
                title: String::new(),
            }),
            meta: ArcSwap::from_pointee(MetaBlock::empty()),
            queue: PageQueue::new(pool, page_size, min_size, max_size),
            dump: Mutex::new(dump),
        })
    }

    /// Basic-auth credential check against this mount's configured user/password.
    ///
    /// Uses the conjunction-of-matches form (`user == expected AND password == expected`);
    /// the OR-short-circuit form seen in some legacy sources is a bug and is not replicated.
    pub fn auth(&self, credentials: &Credentials) -> AuthOutcome {
        match credentials {
            Credentials::Absent => AuthOutcome::NoCredentials,
            Credentials::Basic { user, password } => {
                if user == &self.user && password == &self.password {
                    AuthOutcome::Ok
                } else {
                    AuthOutcome::Rejected
                }
            }
        }
    }

    /// Whether a source is currently attached to this mount.
    pub fn is_started(&self) -> bool {
        self.dynamic.lock().started
    }

    /// Marks the mount as on-air. Returns an error if a source is already attached.
    pub fn mark_started(&self) -> Result<(), RelayError> {
        let mut dynamic = self.dynamic.lock();
        if dynamic.started {
            return Err(RelayError::SourceConflict(self.name.clone()));
        }
        dynamic.started = true;
        dynamic.started_at = Some(Instant::now());
        Ok(())
    }

    /// Records source-reported stream metadata (content-type, genre, description) without
    /// touching queue geometry or the fixed `bit_rate_kbps`.
    pub fn set_source_headers(&self, content_type: &str, genre: Option<&str>, description: Option<&str>) {
        let mut dynamic = self.dynamic.lock();
        dynamic.content_type = content_type.to_string();
        if let Some(genre) = genre {
            dynamic.genre = genre.to_string();
        }
        if let Some(description) = description {
            dynamic.description = description.to_string();
        }
    }

    /// Resets to offline state: `Started=false`, uptime cleared, listener count zeroed,
    /// title cleared, stream URL reset to canonical. Does not touch the page queue — stale
    /// listeners may still be draining it — and does not close the dump file, which stays
    /// open across source reconnects and is only closed when the mount itself is dropped.
    pub fn clear(&self) {
        let mut dynamic = self.dynamic.lock();
        dynamic.started = false;
        dynamic.started_at = None;
        dynamic.listener_count = 0;
        dynamic.title.clear();
        dynamic.stream_url = self.canonical_url.clone();
    }

    /// Increments the live listener count.
    pub fn add_listener(&self) {
        self.dynamic.lock().listener_count += 1;
    }

    /// Decrements the live listener count, floored at zero.
    pub fn remove_listener(&self) {
        let mut dynamic = self.dynamic.lock();
        dynamic.listener_count = (dynamic.listener_count - 1).max(0);
    }

    /// Current listener count for this mount.
    pub fn listener_count(&self) -> i64 {
        self.dynamic.lock().listener_count
    }

    /// Content-type last reported by the connected (or most recent) source.
    pub fn content_type(&self) -> String {
        self.dynamic.lock().content_type.clone()
    }

    /// Advertised genre.
    pub fn genre(&self) -> String {
        self.dynamic.lock().genre.clone()
    }

    /// Advertised description.
    pub fn description(&self) -> String {
        self.dynamic.lock().description.clone()
    }

    /// Current stream URL (canonical unless a source session overrides it).
    pub fn stream_url(&self) -> String {
        self.dynamic.lock().stream_url.clone()
    }

    /// Last `StreamTitle` installed by [`Mount::update_meta`], or empty if none yet.
    pub fn title(&self) -> String {
        self.dynamic.lock().title.clone()
    }

    /// Authenticates, decodes `song`, and atomically replaces the metadata block.
    ///
    /// On charset-decode failure the block is replaced with the empty block rather than
    /// leaving the previous title in place, per the error taxonomy's "metadata decode"
    /// entry: the failure is invisible to listeners, not propagated as a session error.
    pub fn update_meta(&self, credentials: &Credentials, song_raw: &[u8]) -> Result<(), RelayError> {
        match self.auth(credentials) {
            AuthOutcome::Ok => {}
            AuthOutcome::NoCredentials | AuthOutcome::Rejected => {
                return Err(RelayError::Auth(self.name.clone()));
            }
        }
        let block = match decode_song_text(song_raw) {
            Some(title) => {
                self.dynamic.lock().title = title.clone();
                MetaBlock::encode_title(&title)
            }
            None => {
                self.dynamic.lock().title.clear();
                MetaBlock::empty()
            }
        };
        self.meta.store(Arc::new(block));
        Ok(())
    }

    /// The current metadata block's wire bytes.
    pub fn get_icy_meta(&self) -> Arc<MetaBlock> {
        self.meta.load_full()
    }

    /// Appends `data` to the queue and, if a dump file is configured, writes it there too.
    pub fn append(&self, data: &[u8]) -> crate::buffer::Page {
        let page = self.queue.append(data);
        if let Some(file) = self.dump.lock().as_mut() {
            use std::io::Write;
            let _ = file.write_all(data);
        }
        page
    }

    /// A point-in-time status snapshot.
    pub fn mount_info(&self) -> MountInfo {
        let dynamic = self.dynamic.lock();
        let uptime = dynamic.started_at.map(|start| format_hhmmss(start.elapsed()));
        MountInfo {
            name: self.name.clone(),
            listener_count: dynamic.listener_count,
            uptime,
            queue: self.queue.info(),
        }
    }
}

fn format_hhmmss(elapsed: std::time::Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_config() -> MountConfig {
        let mut config = MountConfig::default();
        config.name = "test".to_string();
        config.user = "src".to_string();
        config.password = "pw".to_string();
        config.bit_rate = 128;
        config.burst_size = 65_536;
        config
    }

    #[test]
    fn init_computes_stride_and_queue_sizing() {
        let mount = Mount::init(&demo_config(), "127.0.0.1", 8000, Arc::new(PagePool::new())).unwrap();
        assert_eq!(mount.stride, 128 * 128 * 10);
        // min_size = ceil(65536 / (128*128)) + 2 = ceil(4) + 2 = 6; max_size = 48.
        assert_eq!(mount.queue.size(), 0);
    }

    #[test]
    fn init_rejects_non_positive_bit_rate() {
        let mut config = demo_config();
        config.bit_rate = 0;
        assert!(Mount::init(&config, "h", 1, Arc::new(PagePool::new())).is_err());
    }

    #[test]
    fn auth_requires_conjunction_of_both_fields() {
        let mount = Mount::init(&demo_config(), "h", 1, Arc::new(PagePool::new())).unwrap();
        let right_user_wrong_pass = Credentials::Basic {
            user: "src".to_string(),
            password: "wrong".to_string(),
        };
        assert_eq!(mount.auth(&right_user_wrong_pass), AuthOutcome::Rejected);

        let wrong_user_right_pass = Credentials::Basic {
            user: "wrong".to_string(),
            password: "pw".to_string(),
        };
        assert_eq!(mount.auth(&wrong_user_right_pass), AuthOutcome::Rejected);

        let both_right = Credentials::Basic {
            user: "src".to_string(),
            password: "pw".to_string(),
        };
        assert_eq!(mount.auth(&both_right), AuthOutcome::Ok);

        assert_eq!(mount.auth(&Credentials::Absent), AuthOutcome::NoCredentials);
    }

    #[test]
    fn mark_started_rejects_second_source() {
        let mount = Mount::init(&demo_config(), "h", 1, Arc::new(PagePool::new())).unwrap();
        mount.mark_started().unwrap();
        assert!(mount.mark_started().is_err());
        mount.clear();
        assert!(mount.mark_started().is_ok());
    }

    #[test]
    fn clear_resets_without_dropping_queue() {
        let mount = Mount::init(&demo_config(), "h", 1, Arc::new(PagePool::new())).unwrap();
        mount.append(b"hello");
        mount.add_listener();
        mount.mark_started().unwrap();
        mount.clear();
        assert!(!mount.is_started());
        assert_eq!(mount.listener_count(), 0);
        assert_eq!(mount.queue.size(), 1);
        assert_eq!(mount.stream_url(), mount.canonical_url);
    }

    #[test]
    fn update_meta_requires_auth() {
        let mount = Mount::init(&demo_config(), "h", 1, Arc::new(PagePool::new())).unwrap();
        let bad = Credentials::Basic {
            user: "src".to_string(),
            password: "wrong".to_string(),
        };
        assert!(mount.update_meta(&bad, b"Song").is_err());
    }

    #[test]
    fn update_meta_replaces_block() {
        let mount = Mount::init(&demo_config(), "h", 1, Arc::new(PagePool::new())).unwrap();
        let good = Credentials::Basic {
            user: "src".to_string(),
            password: "pw".to_string(),
        };
        mount.update_meta(&good, b"New Song").unwrap();
        let block = mount.get_icy_meta();
        assert!(!block.is_empty_block());
    }
}
