//! TOML configuration for a node.
//!
//! One file holds both the node's own settings and the screen layout shared
//! by every machine in the arrangement:
//!
//! ```toml
//! [node]
//! nickname = "imac"
//! port = 5872
//!
//! [handshake]
//! retry_interval_ms = 1000
//! max_attempts = 5
//!
//! [screens.imac.right]
//! boundary = 1919
//! low = 0
//! high = 1079
//! neighbor = "macbook"
//!
//! [screens.macbook.left]
//! boundary = 0
//! low = 0
//! high = 899
//! neighbor = "imac"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so a node runs with an empty or
//! missing file.  Edge rules also accept the long key names
//! `perpendicularLow`, `perpendicularHigh`, and `neighborName`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hop_core::domain::layout::ScreenLayout;
use hop_core::peering::HandshakePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

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

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Screen nickname → edge rules.
    #[serde(default)]
    pub screens: ScreenLayout,
}

/// Settings for this node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// This screen's name in `screens` and in `REQUEST_NICKNAME`.
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// UDP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind the socket to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Cursor sampling period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Where the local cursor is parked while input is forwarded.
    #[serde(default = "default_recenter")]
    pub recenter_x: i32,
    #[serde(default = "default_recenter")]
    pub recenter_y: i32,
    /// Addresses to advertise in `introduce`; empty means enumerate.
    #[serde(default)]
    pub advertise: Vec<Ipv4Addr>,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Retry policy for handshakes this node initiates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeConfig {
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Introductions before giving up; `0` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_nickname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "hopscreen".to_string())
}
fn default_port() -> u16 {
    5872
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_poll_interval_ms() -> u64 {
    5
}
fn default_recenter() -> i32 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_retry_interval_ms() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            port: default_port(),
            bind_address: default_bind_address(),
            poll_interval_ms: default_poll_interval_ms(),
            recenter_x: default_recenter(),
            recenter_y: default_recenter(),
            advertise: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl NodeConfig {
    /// The socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` is not an
    /// IP address.
    pub fn bind_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn recenter(&self) -> (i32, i32) {
        (self.recenter_x, self.recenter_y)
    }

    /// Sampling period, never shorter than 1 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl HandshakeConfig {
    pub fn policy(&self) -> HandshakePolicy {
        HandshakePolicy {
            retry_interval: Duration::from_millis(self.retry_interval_ms.max(1)),
            max_attempts: self.max_attempts,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
