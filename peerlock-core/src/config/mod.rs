//! Configuration management for peerlock nodes
//!
//! Defaults can be overridden from a TOML file or from environment
//! variables named `PEERLOCK_<SECTION>_<KEY>`.

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Chunk size used for outbound file transfers (32 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Port the node listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 5000;

/// Main node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub transfer: TransferConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Identity and event settings of the local node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name sent to peers in the handshake
    pub display_name: String,

    pub bind_address: SocketAddr,

    /// Buffered events per subscriber before slow receivers start lagging
    pub event_capacity: usize,
}

/// File transfer limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Ciphertext bytes per FILE_CHUNK
    pub chunk_size: usize,

    /// Largest inbound transfer accepted, in bytes
    pub max_file_size: u64,
}

/// Settings for the TCP transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Frames above this size close the connection
    pub max_frame_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub json_format: bool,

    pub with_timestamp: bool,

    pub with_target: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: "User".to_string(),
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            event_capacity: 256,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: 256 * 1024 * 1024, // 256 MiB
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: PEERLOCK_<SECTION>_<KEY>
    /// Example: PEERLOCK_NODE_DISPLAY_NAME=alice
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `PEERLOCK_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("PEERLOCK_NODE_DISPLAY_NAME") {
            self.node.display_name = name;
        }
        if let Some(addr) = parse_var(&lookup, "PEERLOCK_NODE_BIND_ADDRESS")? {
            self.node.bind_address = addr;
        }
        if let Some(capacity) = parse_var(&lookup, "PEERLOCK_NODE_EVENT_CAPACITY")? {
            self.node.event_capacity = capacity;
        }

        if let Some(size) = parse_var(&lookup, "PEERLOCK_TRANSFER_CHUNK_SIZE")? {
            self.transfer.chunk_size = size;
        }
        if let Some(size) = parse_var(&lookup, "PEERLOCK_TRANSFER_MAX_FILE_SIZE")? {
            self.transfer.max_file_size = size;
        }

        if let Some(timeout) = lookup("PEERLOCK_TRANSPORT_CONNECT_TIMEOUT") {
            self.transport.connect_timeout = humantime_serde::re::humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidValue {
                    key: "PEERLOCK_TRANSPORT_CONNECT_TIMEOUT",
                    reason: e.to_string(),
                })?;
        }
        if let Some(size) = parse_var(&lookup, "PEERLOCK_TRANSPORT_MAX_FRAME_SIZE")? {
            self.transport.max_frame_size = size;
        }

        if let Some(level) = lookup("PEERLOCK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_var(&lookup, "PEERLOCK_LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.display_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "display_name must not be empty".to_string(),
            ));
        }

        if self.node.event_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        // A chunk is base64 encoded inside its envelope, so it must fit in one frame
        if self.transfer.chunk_size.saturating_mul(2) > self.transport.max_frame_size {
            return Err(ConfigError::ValidationFailed(format!(
                "chunk_size {} does not fit in max_frame_size {}",
                self.transfer.chunk_size, self.transport.max_frame_size
            )));
        }

        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue { key, reason: e.to_string() }),
        None => Ok(None),
    }
}
