//! TOML-based configuration for the broker.
//!
//! Reads and writes [`BrokerConfig`].  The file is optional: a missing file
//! yields [`BrokerConfig::default()`], and any field missing from an existing
//! file takes its default.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! ping_interval_secs = 25
//! ping_timeout_secs = 60
//!
//! [reaper]
//! interval_secs = 300
//! mapping_ttl_secs = 3600
//!
//! [storage]
//! data_dir = "data"
//! durability = "strict"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values (for beginners)
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  This is what
//! lets a three-line config file override the port and keep everything else.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::persistence::Durability;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind_address:port` is not a socket address.
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub reaper: ReaperSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listener and WebSocket transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Seconds of silence (pongs included) after which a connection is closed.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// Largest accepted frame, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Per-connection outbound queue length.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

/// Mapping reaper settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReaperSection {
    #[serde(default = "default_reap_interval")]
    pub interval_secs: u64,
    /// Age after which a client→host mapping is deleted.
    #[serde(default = "default_mapping_ttl")]
    pub mapping_ttl_secs: u64,
}

/// Where the durable stores live and how their writes are treated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Credential store file name, relative to `data_dir`.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    /// Legacy trust table file name, relative to `data_dir`.
    #[serde(default = "default_legacy_trust_file")]
    pub legacy_trust_file: String,
    #[serde(default)]
    pub durability: Durability,
}

/// `tracing` settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// Default filter: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    /// `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ping_interval() -> u64 {
    25
}
fn default_ping_timeout() -> u64 {
    60
}
fn default_max_message_size() -> usize {
    500 * 1024 * 1024
}
fn default_outbound_capacity() -> usize {
    1024
}
fn default_reap_interval() -> u64 {
    300
}
fn default_mapping_ttl() -> u64 {
    3600
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_credentials_file() -> String {
    "permanent_access.json".to_string()
}
fn default_legacy_trust_file() -> String {
    "trusted_devices.json".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
            max_message_size: default_max_message_size(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

impl Default for ReaperSection {
    fn default() -> Self {
        Self {
            interval_secs: default_reap_interval(),
            mapping_ttl_secs: default_mapping_ttl(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            credentials_file: default_credentials_file(),
            legacy_trust_file: default_legacy_trust_file(),
            durability: Durability::default(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl ServerSection {
    /// Parses `bind_address:port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] when the pair does not parse.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_address, self.port);
        raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

impl ReaperSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn mapping_ttl(&self) -> Duration {
        Duration::from_secs(self.mapping_ttl_secs)
    }
}

impl StorageSection {
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(&self.credentials_file)
    }

    pub fn legacy_trust_path(&self) -> PathBuf {
        self.data_dir.join(&self.legacy_trust_file)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `BrokerConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<BrokerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BrokerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &BrokerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
