//! Server configuration.
//!
//! Defaults can be overridden from a TOML file; any key left out of the
//! file keeps its default. Command-line and environment overrides are
//! applied on top by the `chatd` binary.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use chat_protocol::DEFAULT_MAX_MESSAGE_SIZE;

use crate::registry::MAX_CLIENTS;

/// Default listening port
pub const DEFAULT_PORT: u16 = 1500;

/// Default listening host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default time a new connection has to identify itself (10 seconds)
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Configuration for the chat server.
///
/// # Example
///
/// ```rust
/// use chatd::config::ServerConfig;
///
/// let config = ServerConfig {
///     port: 0,
///     max_clients: 8,
///     ..Default::default()
/// };
/// assert_eq!(config.host, "0.0.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,

    /// Maximum number of simultaneously registered clients.
    pub max_clients: usize,

    /// Per-recipient write deadline during broadcast, in milliseconds.
    ///
    /// `None` means writes wait indefinitely.
    pub write_timeout_ms: Option<u64>,

    /// Time a new connection has to send its identification message.
    pub handshake_timeout_ms: u64,

    /// Maximum size of one inbound message, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: MAX_CLIENTS,
            write_timeout_ms: None,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Loopback configuration on an ephemeral port.
    pub fn local() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Address to bind, in a form `TcpListener::bind` resolves.
    pub fn bind_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Errors loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: String, error: String },

    #[error("Invalid config: {0}")]
    Parse(String),
}
