//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or a neutral default

use tokio::sync::{broadcast, mpsc, oneshot};

use chat_protocol::ClientId;

use super::client::{ClientHandle, ClientInfo, Outbound};
use super::commands::{RegistryCommand, RegistryError, RegistryEvent, RemovalReason};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// let client = handle.register(identity, "alice".to_string(), writer).await?;
/// let everyone = handle.snapshot().await;
///
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `event_sender` - The broadcast sender for subscribing to events
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register a client under a pre-allocated identity.
    ///
    /// On failure the writer is dropped, closing the outbound half of the
    /// connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameConflict` if the display name is in use
    /// - `RegistryError::Banned` if the identity is banned
    /// - `RegistryError::DuplicateIdentity` if the identity is already registered
    /// - `RegistryError::InvalidName` if the name is empty or too long
    /// - `RegistryError::RegistryFull` if the registry is at capacity
    /// - `RegistryError::ShuttingDown` once shutdown has begun
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        identity: ClientId,
        name: String,
        writer: Outbound,
    ) -> Result<ClientHandle, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                identity,
                name,
                writer,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a client from the registry.
    ///
    /// Idempotent. Returns the removed handle, or `None` if the identity was
    /// not registered or the actor is gone. Does not close the connection.
    pub async fn unregister(
        &self,
        identity: ClientId,
        reason: RemovalReason,
    ) -> Option<ClientHandle> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Unregister {
                identity,
                reason,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Ban an identity.
    ///
    /// If the identity is registered, its handle is removed, terminated and
    /// returned so the caller can finish closing the connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn ban(&self, identity: ClientId) -> Result<Option<ClientHandle>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Ban {
                identity,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Lift a ban. Returns `true` if the identity was banned.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn unban(&self, identity: ClientId) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Unban {
                identity,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Check whether an identity is banned.
    ///
    /// Returns `false` if communication with the actor fails.
    pub async fn is_banned(&self, identity: ClientId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::IsBanned {
                identity,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Get a single client by identity.
    pub async fn get(&self, identity: ClientId) -> Option<ClientHandle> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Get {
                identity,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Consistent point-in-time copy of every registered handle.
    ///
    /// Ordered by identity. Returns an empty vector if communication with
    /// the actor fails.
    pub async fn snapshot(&self) -> Vec<ClientHandle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Identity and name of every registered client.
    pub async fn list(&self) -> Vec<ClientInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::List { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Every banned identity, ascending.
    pub async fn banned(&self) -> Vec<ClientId> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Banned { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Seal the registry so that every later registration fails.
    ///
    /// Completes once the actor has processed the command.
    pub async fn begin_shutdown(&self) {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::BeginShutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Remove and return every registered handle.
    pub async fn drain(&self) -> Vec<ClientHandle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Drain { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Subscribe to registry events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
