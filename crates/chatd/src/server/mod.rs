//! TCP chat server.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a ConnectionHandler for each registered client
//! - Relays every ordinary message to every registered client
//! - Supports ban/unban and a graceful, idempotent shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │  ban / unban / broadcast / shutdown
//! └───────┬─────────┘
//!         │ spawn
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionAccept.│────▶│  RegistryHandle │
//! │  (TcpListener)  │     │                 │
//! └───────┬─────────┘     └────────▲────────┘
//!         │ spawn (tracked)        │ snapshot
//!         ▼                        │
//! ┌─────────────────┐     ┌────────┴────────┐
//! │ConnectionHandler│────▶│   Broadcaster   │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Shutdown
//!
//! 1. The registry is sealed; new registrations fail.
//! 2. One SHUTDOWN message is broadcast; the broadcaster then closes.
//! 3. Every handle is drained from the registry and its connection closed.
//! 4. The acceptor stops and the listener is dropped.
//! 5. The call returns once every connection task has finished.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Per-client errors are logged and never stop the server

mod acceptor;
mod broadcast;
mod connection;

pub use acceptor::{AcceptorSettings, ConnectionAcceptor};
pub use broadcast::{Broadcaster, BroadcasterClosed, Delivery};
pub use connection::{ConnectionError, ConnectionHandler, HandlerExit};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast as event_channel;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use chat_protocol::{ClientId, Message};

use crate::config::ServerConfig;
use crate::registry::{spawn_registry, ClientInfo, RegistryError, RegistryEvent, RegistryHandle};

/// Running chat server.
///
/// Cheap to clone; every clone controls the same server.
#[derive(Clone)]
pub struct ChatServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    local_addr: SocketAddr,
    registry: RegistryHandle,
    broadcaster: Broadcaster,

    /// Stops the accept loop and aborts pending handshakes
    accept_token: CancellationToken,

    /// Fires once shutdown has completed
    stopped_token: CancellationToken,

    /// Accept loop and every connection task
    tasks: TaskTracker,

    shutting_down: AtomicBool,
}

impl ChatServer {
    /// Binds the listening endpoint and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the endpoint cannot be bound.
    pub async fn startup(config: ServerConfig) -> Result<Self, ServerError> {
        let (host, port) = config.bind_target();
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| ServerError::Bind {
                addr: format!("{host}:{port}"),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: format!("{host}:{port}"),
            error: e.to_string(),
        })?;

        let registry = spawn_registry(config.max_clients);
        let broadcaster = Broadcaster::new(registry.clone(), config.write_timeout());
        let accept_token = CancellationToken::new();
        let tasks = TaskTracker::new();

        let acceptor = ConnectionAcceptor::new(
            listener,
            registry.clone(),
            broadcaster.clone(),
            AcceptorSettings {
                handshake_timeout: config.handshake_timeout(),
                max_message_size: config.max_message_size,
            },
            accept_token.clone(),
            tasks.clone(),
        );
        tasks.spawn(acceptor.run());

        info!(
            addr = %local_addr,
            max_clients = config.max_clients,
            "Chat server listening"
        );

        Ok(Self {
            inner: Arc::new(ServerInner {
                local_addr,
                registry,
                broadcaster,
                accept_token,
                stopped_token: CancellationToken::new(),
                tasks,
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Delivers `message` to every registered client.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ShutdownInProgress` once shutdown has begun.
    pub async fn broadcast(&self, message: &Message) -> Result<Delivery, ServerError> {
        self.ensure_running()?;
        self.inner
            .broadcaster
            .broadcast(message)
            .await
            .map_err(|_| ServerError::ShutdownInProgress)
    }

    /// Bans `identity` and forcibly closes its connection if it is live.
    ///
    /// Returns `true` if a live connection was closed.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ShutdownInProgress` once shutdown has begun.
    pub async fn remove(&self, identity: ClientId) -> Result<bool, ServerError> {
        self.ensure_running()?;
        match self.inner.registry.ban(identity).await? {
            Some(handle) => {
                handle.close().await;
                info!(identity = %identity, name = %handle.name(), "Client removed");
                Ok(true)
            }
            None => {
                info!(identity = %identity, "Identity banned (not connected)");
                Ok(false)
            }
        }
    }

    /// Bans `identity` without waiting for its connection to close.
    ///
    /// The handle is still torn down immediately; the handler closes the
    /// connection when it observes termination.
    pub async fn ban(&self, identity: ClientId) -> Result<(), ServerError> {
        self.ensure_running()?;
        self.inner.registry.ban(identity).await?;
        Ok(())
    }

    /// Lifts a ban. Returns `true` if the identity was banned.
    ///
    /// A client disconnected by the ban must reconnect to rejoin.
    pub async fn unban(&self, identity: ClientId) -> Result<bool, ServerError> {
        self.ensure_running()?;
        Ok(self.inner.registry.unban(identity).await?)
    }

    pub async fn is_banned(&self, identity: ClientId) -> bool {
        self.inner.registry.is_banned(identity).await
    }

    /// Registered clients, ordered by identity.
    pub async fn clients(&self) -> Vec<ClientInfo> {
        self.inner.registry.list().await
    }

    /// Banned identities, ascending.
    pub async fn banned(&self) -> Vec<ClientId> {
        self.inner.registry.banned().await
    }

    /// Subscribe to join/leave/ban events.
    pub fn subscribe(&self) -> event_channel::Receiver<RegistryEvent> {
        self.inner.registry.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), ServerError> {
        if self.is_shutting_down() {
            return Err(ServerError::ShutdownInProgress);
        }
        Ok(())
    }

    /// Shuts the server down.
    ///
    /// Idempotent: a second call waits for the first to finish.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            self.wait_for_shutdown().await;
            return;
        }

        info!("Shutting down chat server");
        let inner = &self.inner;

        inner.registry.begin_shutdown().await;

        match inner.broadcaster.broadcast_final(&Message::shutdown()).await {
            Ok(delivery) => info!(
                delivered = delivery.delivered,
                failed = delivery.failed.len(),
                "Shutdown notice sent"
            ),
            Err(BroadcasterClosed) => warn!("Broadcaster already closed"),
        }

        let handles = inner.registry.drain().await;
        let closed = handles.len();
        for handle in handles {
            handle.close().await;
        }

        inner.accept_token.cancel();
        inner.tasks.close();
        inner.tasks.wait().await;

        inner.stopped_token.cancel();
        info!(closed, "Chat server stopped");
    }

    /// Resolves once shutdown has completed.
    pub async fn wait_for_shutdown(&self) {
        self.inner.stopped_token.cancelled().await;
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Server is shutting down")]
    ShutdownInProgress,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
