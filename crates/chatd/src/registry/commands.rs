//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use thiserror::Error;
use tokio::sync::oneshot;

use chat_protocol::ClientId;

use super::client::{ClientHandle, ClientInfo, Outbound};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command that produces a result carries a oneshot channel for the
/// response. The actor processes commands one at a time, so every command
/// observes the registry either entirely before or entirely after any other.
pub enum RegistryCommand {
    /// Admit a client under `identity` with the requested display name.
    ///
    /// # Errors
    /// - `RegistryError::NameConflict` if the name is taken
    /// - `RegistryError::Banned` if the identity is banned
    /// - `RegistryError::InvalidName` if the name is empty or too long
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::ShuttingDown` once shutdown has begun
    Register {
        /// Pre-allocated identity for the new client
        identity: ClientId,
        /// Requested display name (normalized by the actor)
        name: String,
        /// Outbound half of the connection
        writer: Outbound,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<ClientHandle, RegistryError>>,
    },

    /// Remove a client. Idempotent: removing an unknown identity is a no-op.
    ///
    /// Responds with the removed handle, if there was one.
    Unregister {
        /// Identity to remove
        identity: ClientId,
        /// Why the client is leaving
        reason: RemovalReason,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<ClientHandle>>,
    },

    /// Ban an identity, removing and terminating its handle if registered.
    Ban {
        /// Identity to ban
        identity: ClientId,
        /// Channel to send the removed handle, if any
        respond_to: oneshot::Sender<Option<ClientHandle>>,
    },

    /// Lift a ban. Responds `true` if the identity was banned.
    Unban {
        /// Identity to unban
        identity: ClientId,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// Check whether an identity is banned.
    IsBanned {
        /// Identity to check
        identity: ClientId,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// Get a single client by identity.
    Get {
        /// Identity to look up
        identity: ClientId,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<ClientHandle>>,
    },

    /// Point-in-time copy of every registered handle, ordered by identity.
    Snapshot {
        /// Channel to send the handles
        respond_to: oneshot::Sender<Vec<ClientHandle>>,
    },

    /// Identity and name of every registered client, ordered by identity.
    List {
        /// Channel to send the listing
        respond_to: oneshot::Sender<Vec<ClientInfo>>,
    },

    /// Every banned identity, ascending.
    Banned {
        /// Channel to send the identities
        respond_to: oneshot::Sender<Vec<ClientId>>,
    },

    /// Refuse all further registrations.
    BeginShutdown {
        /// Acknowledged once the registry is sealed
        respond_to: oneshot::Sender<()>,
    },

    /// Remove and return every registered handle.
    Drain {
        /// Channel to send the removed handles
        respond_to: oneshot::Sender<Vec<ClientHandle>>,
    },
}

impl std::fmt::Debug for RegistryCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { identity, name, .. } => f
                .debug_struct("Register")
                .field("identity", identity)
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Unregister { identity, reason, .. } => f
                .debug_struct("Unregister")
                .field("identity", identity)
                .field("reason", reason)
                .finish_non_exhaustive(),
            Self::Ban { identity, .. } => f.debug_struct("Ban").field("identity", identity).finish_non_exhaustive(),
            Self::Unban { identity, .. } => f.debug_struct("Unban").field("identity", identity).finish_non_exhaustive(),
            Self::IsBanned { identity, .. } => f.debug_struct("IsBanned").field("identity", identity).finish_non_exhaustive(),
            Self::Get { identity, .. } => f.debug_struct("Get").field("identity", identity).finish_non_exhaustive(),
            Self::Snapshot { .. } => f.write_str("Snapshot"),
            Self::List { .. } => f.write_str("List"),
            Self::Banned { .. } => f.write_str("Banned"),
            Self::BeginShutdown { .. } => f.write_str("BeginShutdown"),
            Self::Drain { .. } => f.write_str("Drain"),
        }
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The display name is already used by a registered client.
    #[error("display name already in use: {0}")]
    NameConflict(String),

    /// The identity already belongs to a registered client.
    #[error("client {0} is already registered")]
    DuplicateIdentity(ClientId),

    /// The identity is banned.
    #[error("client {0} is banned")]
    Banned(ClientId),

    /// The display name is empty or too long.
    #[error("invalid display name: {0:?}")]
    InvalidName(String),

    /// The registry has reached its maximum client capacity.
    #[error("registry is full (max: {max} clients)")]
    RegistryFull {
        /// Maximum number of clients allowed
        max: usize,
    },

    /// Shutdown has begun; no further clients are admitted.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A client was admitted.
    Joined {
        identity: ClientId,
        name: String,
    },

    /// A client left the registry.
    Left {
        identity: ClientId,
        name: String,
        reason: RemovalReason,
    },

    /// An identity was banned.
    Banned { identity: ClientId },

    /// A ban was lifted.
    Unbanned { identity: ClientId },
}

/// Reason why a client was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Client sent LOGOUT.
    Logout,

    /// Client closed its connection.
    Disconnected,

    /// Reading from the client failed.
    ConnectionFailed,

    /// Writing to the client during a broadcast failed.
    WriteFailed,

    /// Operator banned the client.
    Banned,

    /// Server shut down.
    Shutdown,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logout => write!(f, "logged out"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Banned => write!(f, "banned"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}
