//! Process configuration: TOML loading, validation, and documented defaults.
//!
//! Grounded on `massive-graph-core/src/core/config.rs`'s shape (`Config`/`load_config`/
//! `load_config_or_default`), adapted to this relay's own sections (`limits`, `auth`, `paths`,
//! `mounts`) per the original server's `props.go`.

use std::path::Path;

use serde::Deserialize;

use crate::error::RelayError;
use crate::{log_info, log_warn};

/// Top-level process configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Station/server name advertised in status output and logs.
    pub name: String,
    /// Admin contact, informational only.
    pub admin: Option<String>,
    /// Physical/organizational location, informational only.
    pub location: Option<String>,
    /// Bind address for the listening socket.
    pub host: String,
    /// Listening socket settings.
    pub socket: SocketConfig,
    /// Server-wide admission and timeout limits.
    pub limits: LimitsConfig,
    /// Control-plane authentication.
    pub auth: AuthConfig,
    /// Filesystem paths used for dumps and logs.
    pub paths: PathsConfig,
    /// The fixed mount table.
    pub mounts: Vec<MountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "icy-relay".to_string(),
            admin: None,
            location: None,
            host: default_host(),
            socket: SocketConfig::default(),
            limits: LimitsConfig::default(),
            auth: AuthConfig::default(),
            paths: PathsConfig::default(),
            mounts: vec![MountConfig::demo()],
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Listening socket configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// TCP port to accept connections on.
    pub port: u16,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self { port: 8765 }
    }
}

/// Server-wide admission and timeout limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent listeners across all mounts.
    pub clients: u32,
    /// Maximum concurrent sources across all mounts.
    pub sources: u32,
    /// Seconds of consecutive EOF reads before a source session is declared idle.
    pub source_idle_timeout: u64,
    /// Seconds a listener's cursor may stall at the tail of its queue before timing out.
    pub empty_buffer_idle_timeout: u64,
    /// Seconds allowed for a single write to a listener socket to complete.
    pub write_timeout: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            clients: 500,
            sources: 8,
            source_idle_timeout: 10,
            empty_buffer_idle_timeout: 10,
            write_timeout: 5,
        }
    }
}

/// Control-plane authentication.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Password required for the metadata-update command and any other admin action.
    pub admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password: "changeme".to_string(),
        }
    }
}

/// Filesystem paths used by the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory all relative paths below are resolved against.
    pub base: String,
    /// Directory for static/web assets (unused by the streaming core; kept for config
    /// compatibility with the rest of this codebase's layout).
    pub web: String,
    /// Directory for log output, when file-based logging is enabled.
    pub log: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base: ".".to_string(),
            web: "./web".to_string(),
            log: "./log".to_string(),
        }
    }
}

/// One mount's static configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Mount name, e.g. `"RockRadio96"`; exposed at path `/RockRadio96`.
    pub name: String,
    /// Source username for Basic auth.
    pub user: String,
    /// Source password for Basic auth.
    pub password: String,
    /// Human-readable description advertised to listeners.
    pub description: String,
    /// Declared bit-rate in kbit/s; drives page size, metadata stride, and queue sizing.
    pub bit_rate: u32,
    /// Advertised genre.
    pub genre: String,
    /// Burst window size in bytes delivered to a newly connected listener.
    pub burst_size: usize,
    /// Optional path to dump raw audio bytes for the lifetime of each source session.
    pub dump_file: Option<String>,
    /// Optional cap on concurrent listeners for this mount specifically, in addition to the
    /// server-wide `limits.clients`.
    pub max_listeners: Option<u32>,
}

impl MountConfig {
    fn demo() -> Self {
        Self {
            name: "demo".to_string(),
            user: "source".to_string(),
            password: "changeme".to_string(),
            description: "Demo mount".to_string(),
            bit_rate: 128,
            genre: "Various".to_string(),
            burst_size: 65_536,
            dump_file: None,
            max_listeners: None,
        }
    }

    /// Validates the invariants §4.8 requires at load time.
    fn validate(&self) -> Result<(), RelayError> {
        if self.name.trim().is_empty() {
            return Err(RelayError::Config("mount name must not be empty".into()));
        }
        if self.bit_rate == 0 {
            return Err(RelayError::Config(format!(
                "mount {}: bit_rate must be positive",
                self.name
            )));
        }
        if self.burst_size == 0 {
            return Err(RelayError::Config(format!(
                "mount {}: burst_size must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self::demo()
    }
}

impl Config {
    /// Parses `text` as TOML and validates every mount definition.
    pub fn from_toml_str(text: &str) -> Result<Self, RelayError> {
        let config: Config =
            toml::from_str(text).map_err(|e| RelayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every mount in the table; a config with zero mounts is legal.
    pub fn validate(&self) -> Result<(), RelayError> {
        let mut seen = std::collections::HashSet::new();
        for mount in &self.mounts {
            mount.validate()?;
            if !seen.insert(mount.name.clone()) {
                return Err(RelayError::Config(format!(
                    "duplicate mount name {}",
                    mount.name
                )));
            }
        }
        Ok(())
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Loads configuration from `path` if given and readable; otherwise logs a warning and
    /// falls back to [`Config::default`]. Mirrors the "degrade to defaults, log why" shape
    /// used by the rest of this codebase's config loading.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(config) => {
                    log_info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    log_warn!(path = %path.display(), error = %err, "failed to load configuration, using defaults");
                    Self::default()
                }
            },
            None => {
                log_warn!("no --config path given, using default configuration");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn empty_mount_table_is_legal() {
        let config = Config {
            mounts: vec![],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_bit_rate_fails_validation() {
        let mut mount = MountConfig::demo();
        mount.bit_rate = 0;
        let config = Config {
            mounts: vec![mount],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_burst_size_fails_validation() {
        let mut mount = MountConfig::demo();
        mount.burst_size = 0;
        let config = Config {
            mounts: vec![mount],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_mount_names_fail_validation() {
        let config = Config {
            mounts: vec![MountConfig::demo(), MountConfig::demo()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml = r#"
            name = "MyRadio"

            [[mounts]]
            name = "Main"
            user = "source"
            password = "hunter2"
            description = "Main stream"
            bit_rate = 192
            genre = "Electronic"
            burst_size = 131072
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.name, "MyRadio");
        assert_eq!(config.mounts.len(), 1);
        assert_eq!(config.mounts[0].bit_rate, 192);
        assert_eq!(config.limits.clients, 500);
    }
}
