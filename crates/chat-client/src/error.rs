//! Error types for the chat client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use chat_protocol::ProtocolError;
use thiserror::Error;

/// Chat client errors.
///
/// # Example
///
/// ```rust,ignore
/// use chat_client::error::{ClientError, Result};
///
/// fn check(nickname: &str) -> Result<()> {
///     if nickname.trim().is_empty() {
///         return Err(ClientError::InvalidNickname(nickname.to_string()));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    ///
    /// Usually the server is not running or the host/port is wrong.
    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// The server did not accept the connection in time.
    #[error("Connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// Nickname is empty after trimming.
    #[error("Invalid nickname: {0:?}")]
    InvalidNickname(String),

    /// The connection is gone; nothing more can be sent.
    #[error("Not connected to server")]
    NotConnected,

    /// Framing or I/O failure on an open connection.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let err = ClientError::Connect {
            addr: "localhost:1500".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("localhost:1500"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: ClientError = ProtocolError::TooLarge { max: 10 }.into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
