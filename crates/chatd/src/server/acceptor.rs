//! TCP accept loop.
//!
//! Each accepted connection gets the next identity, is given a bounded
//! window to identify itself, and is registered. A connection whose
//! registration is refused is closed without a handler; the peer sees only
//! the close.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use chat_protocol::{wire, ClientId, MessageType};

use super::broadcast::Broadcaster;
use super::connection::{ConnectionError, ConnectionHandler};
use crate::registry::{ClientHandle, RegistryHandle};

/// Limits applied to every new connection.
#[derive(Debug, Clone, Copy)]
pub struct AcceptorSettings {
    pub handshake_timeout: Duration,
    pub max_message_size: usize,
}

/// Accepts connections and starts one handler per registered client.
pub struct ConnectionAcceptor {
    listener: TcpListener,
    registry: RegistryHandle,
    broadcaster: Broadcaster,
    settings: AcceptorSettings,

    /// Identity counter; 0 is reserved for the server
    next_identity: AtomicU64,

    cancel_token: CancellationToken,
    tasks: TaskTracker,
}

impl ConnectionAcceptor {
    pub fn new(
        listener: TcpListener,
        registry: RegistryHandle,
        broadcaster: Broadcaster,
        settings: AcceptorSettings,
        cancel_token: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            listener,
            registry,
            broadcaster,
            settings,
            next_identity: AtomicU64::new(1),
            cancel_token,
            tasks,
        }
    }

    /// Accepts connections until the cancellation token fires.
    ///
    /// The listener is dropped on return, so the port stops accepting.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Acceptor stopping");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.handle_connection(stream, peer),
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }
    }

    fn allocate_identity(&self) -> ClientId {
        ClientId::new(self.next_identity.fetch_add(1, Ordering::Relaxed))
    }

    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let identity = self.allocate_identity();
        let registry = self.registry.clone();
        let broadcaster = self.broadcaster.clone();
        let settings = self.settings;
        let cancel_token = self.cancel_token.clone();

        debug!(identity = %identity, peer = %peer, "Accepted connection");

        self.tasks.spawn(async move {
            let (handle, reader) =
                match admit(stream, identity, &registry, settings, &cancel_token).await {
                    Ok(admitted) => admitted,
                    Err(e) => {
                        warn!(identity = %identity, peer = %peer, error = %e, "Connection refused");
                        return;
                    }
                };

            info!(identity = %identity, name = %handle.name(), peer = %peer, "Client joined");

            ConnectionHandler::new(
                handle,
                reader,
                registry,
                broadcaster,
                settings.max_message_size,
            )
            .run()
            .await;
        });
    }
}

/// Reads the identification message and registers the client.
///
/// On any error the stream halves are dropped, which closes the connection.
async fn admit(
    stream: TcpStream,
    identity: ClientId,
    registry: &RegistryHandle,
    settings: AcceptorSettings,
    cancel_token: &CancellationToken,
) -> Result<(ClientHandle, BufReader<OwnedReadHalf>), ConnectionError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let hello = tokio::select! {
        _ = cancel_token.cancelled() => return Err(ConnectionError::Cancelled),
        result = timeout(
            settings.handshake_timeout,
            wire::read_message(&mut reader, settings.max_message_size),
        ) => result.map_err(|_| ConnectionError::HandshakeTimeout(settings.handshake_timeout))??,
    };

    let hello = hello.ok_or(ConnectionError::ClosedBeforeHandshake)?;
    if hello.kind() != MessageType::Ordinary {
        return Err(ConnectionError::UnexpectedHandshake(hello.kind()));
    }

    let handle = registry
        .register(identity, hello.body().to_string(), Box::new(write_half))
        .await?;

    Ok((handle, reader))
}
