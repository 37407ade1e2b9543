//! Server connection for the console chat client.
//!
//! This module provides the `ChatClient` which handles:
//! - Connecting to the server and sending the identification message
//! - Reading server messages in a background task and forwarding them as events
//! - Sending chat text and the logout notice
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chat_protocol::{wire, ClientId, Message, MessageType, DEFAULT_MAX_MESSAGE_SIZE};

use crate::error::{ClientError, Result};

/// Buffered server events before the reader task waits on the consumer
const EVENT_BUFFER: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the chat client.
///
/// # Example
///
/// ```rust
/// use chat_client::client::ClientConfig;
///
/// let config = ClientConfig {
///     nickname: "alice".to_string(),
///     port: 4000,
///     ..Default::default()
/// };
/// assert_eq!(config.address(), "localhost:4000");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Display name to request.
    pub nickname: String,

    /// Maximum time to establish the TCP connection.
    pub connect_timeout: Duration,

    /// Maximum size of one incoming message, in bytes.
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1500,
            nickname: String::new(),
            connect_timeout: Duration::from_secs(5),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// `host:port` as passed to the resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Something the server did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A relayed chat message
    Message(Message),

    /// The server is shutting down; the connection is over
    ServerShutdown,

    /// The connection closed without a shutdown notice
    Disconnected,
}

// ============================================================================
// Chat Client
// ============================================================================

/// Connected chat client.
///
/// Server messages arrive through [`next_event`](Self::next_event). For a
/// console loop that reads input and events at the same time, use
/// [`split`](Self::split).
pub struct ChatClient {
    sender: ChatSender,
    events: mpsc::Receiver<ClientEvent>,
}

/// Sending half of a [`ChatClient`].
pub struct ChatSender {
    writer: Option<OwnedWriteHalf>,
    cancel_token: CancellationToken,
    reader_task: JoinHandle<()>,
}

impl ChatClient {
    /// Connects to the server and identifies as `config.nickname`.
    ///
    /// The server gives no explicit acknowledgement: a refused nickname
    /// shows up as [`ClientEvent::Disconnected`] shortly after connecting.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let nickname = config.nickname.trim();
        if nickname.is_empty() {
            return Err(ClientError::InvalidNickname(config.nickname.clone()));
        }

        let addr = config.address();
        let stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ClientError::Connect {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ClientError::ConnectTimeout {
                    addr,
                    timeout: config.connect_timeout,
                })
            }
        };

        let (reader, mut writer) = stream.into_split();
        wire::write_message(&mut writer, &Message::hello(nickname)).await?;
        info!(addr = %addr, nickname = %nickname, "Connected to chat server");

        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let cancel_token = CancellationToken::new();
        let reader_task = tokio::spawn(read_events(
            BufReader::new(reader),
            config.max_message_size,
            event_tx,
            cancel_token.clone(),
        ));

        Ok(Self {
            sender: ChatSender {
                writer: Some(writer),
                cancel_token,
                reader_task,
            },
            events,
        })
    }

    /// Sends a line of chat text.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.sender.send(text).await
    }

    /// Next server event, or `None` once the event stream has ended.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Sends LOGOUT and closes the connection.
    pub async fn logout(self) -> Result<()> {
        self.sender.logout().await
    }

    /// Separates the sending half from the event stream.
    pub fn split(self) -> (ChatSender, mpsc::Receiver<ClientEvent>) {
        (self.sender, self.events)
    }
}

impl ChatSender {
    /// Sends a line of chat text.
    ///
    /// The server ignores the id on client messages and stamps its own.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(ClientError::NotConnected)?;
        match wire::write_message(writer, &Message::ordinary(ClientId::UNASSIGNED, text)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.writer = None;
                Err(e.into())
            }
        }
    }

    /// Sends LOGOUT, closes the connection and stops the reader task.
    pub async fn logout(mut self) -> Result<()> {
        let result = match self.writer.as_mut() {
            Some(writer) => wire::write_message(writer, &Message::logout(ClientId::UNASSIGNED))
                .await
                .map_err(ClientError::from),
            None => Err(ClientError::NotConnected),
        };

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Error closing connection");
            }
        }

        self.cancel_token.cancel();
        if let Err(e) = (&mut self.reader_task).await {
            debug!(error = %e, "Reader task ended abnormally");
        }

        result
    }
}

impl Drop for ChatSender {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Forwards server messages until shutdown, disconnect or cancellation.
async fn read_events(
    mut reader: BufReader<OwnedReadHalf>,
    max_message_size: usize,
    events: mpsc::Sender<ClientEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Reader task cancelled");
                return;
            }
            next = wire::read_message(&mut reader, max_message_size) => next,
        };

        let event = match next {
            Ok(Some(msg)) => match msg.kind() {
                MessageType::Ordinary => ClientEvent::Message(msg),
                MessageType::Shutdown => ClientEvent::ServerShutdown,
                MessageType::Logout => {
                    debug!(id = %msg.id(), "Ignoring LOGOUT from server");
                    continue;
                }
            },
            Ok(None) => ClientEvent::Disconnected,
            Err(e) => {
                warn!(error = %e, "Lost connection to server");
                ClientEvent::Disconnected
            }
        };

        let last = !matches!(event, ClientEvent::Message(_));
        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.address(), "localhost:1500");
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[tokio::test]
    async fn test_blank_nickname_rejected_before_connecting() {
        let config = ClientConfig {
            nickname: "  ".to_string(),
            ..Default::default()
        };
        let result = ChatClient::connect(&config).await;
        assert!(matches!(result, Err(ClientError::InvalidNickname(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a port nobody is listening on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            nickname: "alice".to_string(),
            ..Default::default()
        };
        let result = ChatClient::connect(&config).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }
}
