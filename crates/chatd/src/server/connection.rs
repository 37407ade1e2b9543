//! Per-client connection handling.
//!
//! Once a connection has registered, its `ConnectionHandler` reads
//! messages until the client logs out, the connection fails, or the
//! client's handle is terminated (ban, write failure, shutdown). Every
//! exit path leaves the client unregistered.

use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use chat_protocol::{wire, MessageType, ProtocolError};

use super::broadcast::Broadcaster;
use crate::registry::{ClientHandle, RegistryError, RegistryHandle, RemovalReason};

/// Reasons a connection never reached a running handler.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no identification message within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("connection closed before identification")]
    ClosedBeforeHandshake,

    #[error("expected an ordinary identification message, got {0}")]
    UnexpectedHandshake(MessageType),

    #[error("server stopped accepting connections")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("registration refused: {0}")]
    Refused(#[from] RegistryError),
}

/// Why a handler stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerExit {
    /// Client sent LOGOUT
    Logout,
    /// Peer closed the connection
    Disconnected,
    /// Read failed or the client sent something unreadable
    Failed,
    /// Handle was terminated by a ban, a failed write or shutdown
    Terminated,
    /// Server stopped accepting broadcasts
    Closing,
}

impl HandlerExit {
    /// Reason to record, or `None` if whoever terminated the handle has
    /// already removed it.
    fn removal_reason(self) -> Option<RemovalReason> {
        match self {
            HandlerExit::Logout => Some(RemovalReason::Logout),
            HandlerExit::Disconnected => Some(RemovalReason::Disconnected),
            HandlerExit::Failed => Some(RemovalReason::ConnectionFailed),
            HandlerExit::Closing => Some(RemovalReason::Shutdown),
            HandlerExit::Terminated => None,
        }
    }
}

/// Reads and dispatches messages for one registered client.
pub struct ConnectionHandler<R> {
    handle: ClientHandle,
    reader: R,
    registry: RegistryHandle,
    broadcaster: Broadcaster,
    max_message_size: usize,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        handle: ClientHandle,
        reader: R,
        registry: RegistryHandle,
        broadcaster: Broadcaster,
        max_message_size: usize,
    ) -> Self {
        Self {
            handle,
            reader,
            registry,
            broadcaster,
            max_message_size,
        }
    }

    /// Runs the read loop to completion.
    ///
    /// The inbound half of the connection is dropped when this returns.
    pub async fn run(mut self) -> HandlerExit {
        let identity = self.handle.identity();
        let exit = self.read_loop().await;

        self.handle.terminate();
        if let Some(reason) = exit.removal_reason() {
            // No-op if the identity was already removed
            self.registry.unregister(identity, reason).await;
        }

        debug!(identity = %identity, exit = ?exit, "Connection handler finished");
        exit
    }

    async fn read_loop(&mut self) -> HandlerExit {
        let identity = self.handle.identity();

        loop {
            let next = tokio::select! {
                _ = self.handle.terminated() => return HandlerExit::Terminated,
                next = wire::read_message(&mut self.reader, self.max_message_size) => next,
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!(identity = %identity, "Client disconnected");
                    return HandlerExit::Disconnected;
                }
                Err(ProtocolError::Io(e)) => {
                    warn!(identity = %identity, error = %e, "Connection read failed");
                    return HandlerExit::Failed;
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Dropping client after bad message");
                    return HandlerExit::Failed;
                }
            };

            match message.kind() {
                MessageType::Logout => {
                    info!(identity = %identity, name = %self.handle.name(), "Client logged out");
                    return HandlerExit::Logout;
                }
                MessageType::Shutdown => {
                    debug!(identity = %identity, "Ignoring SHUTDOWN sent by client");
                }
                MessageType::Ordinary => {
                    // The sender id on the wire is not trusted.
                    let stamped = message.with_sender(identity);
                    if self.broadcaster.broadcast(&stamped).await.is_err() {
                        return HandlerExit::Closing;
                    }
                }
            }
        }
    }
}
