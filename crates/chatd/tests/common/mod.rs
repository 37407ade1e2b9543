//! Shared helpers for the chatd integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use chat_protocol::{wire, ClientId, Message};
use chatd::config::ServerConfig;
use chatd::server::ChatServer;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for one message or for the server to settle
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between registry polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Max message size used by test clients when reading
pub const CLIENT_READ_LIMIT: usize = 1 << 20;

// ============================================================================
// Test Server
// ============================================================================

/// Running server on an ephemeral loopback port.
pub struct TestServer {
    pub server: ChatServer,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(ServerConfig::local()).await
    }

    pub async fn spawn_with(config: ServerConfig) -> Self {
        let server = ChatServer::startup(config).await.expect("start server");
        Self { server }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Connects and identifies, without waiting for registration.
    pub async fn connect_raw(&self, name: &str) -> TestClient {
        let mut client = TestClient::open(self.addr()).await;
        client.send(&Message::hello(name)).await;
        client
    }

    /// Connects, identifies, and waits until the server has registered
    /// `name`. Returns the client and its server-assigned identity.
    pub async fn join(&self, name: &str) -> (TestClient, ClientId) {
        let client = self.connect_raw(name).await;
        let identity = self.wait_for_name(name).await;
        (client, identity)
    }

    /// Polls until a client named `name` is registered.
    pub async fn wait_for_name(&self, name: &str) -> ClientId {
        let start = tokio::time::Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            let clients = self.server.clients().await;
            if let Some(info) = clients.iter().find(|c| c.name == name) {
                return info.identity;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!("{name} was not registered within {RECV_TIMEOUT:?}");
    }

    /// Polls until exactly `count` clients are registered.
    pub async fn wait_for_count(&self, count: usize) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            if self.server.clients().await.len() == count {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
        let actual = self.server.clients().await.len();
        panic!("expected {count} clients, have {actual}");
    }

    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Raw protocol client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn open(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to server");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, msg: &Message) {
        wire::write_message(&mut self.writer, msg).await.unwrap();
    }

    /// Sends a line that may not be a valid message.
    pub async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn say(&mut self, text: &str) {
        // Sender id on the wire is ignored by the server
        self.send(&Message::ordinary(ClientId::SERVER, text)).await;
    }

    /// Next message, or `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Option<Message> {
        match timeout(RECV_TIMEOUT, wire::read_message(&mut self.reader, CLIENT_READ_LIMIT)).await {
            Ok(Ok(msg)) => msg,
            // A reset counts as closed
            Ok(Err(_)) => None,
            Err(_) => panic!("no message within {RECV_TIMEOUT:?}"),
        }
    }

    /// Asserts the next message is an ordinary message from `sender`.
    pub async fn expect_ordinary(&mut self, sender: ClientId, body: &str) {
        let msg = self.recv().await.expect("connection closed unexpectedly");
        assert_eq!(msg.kind(), chat_protocol::MessageType::Ordinary, "got {msg:?}");
        assert_eq!(msg.id(), sender, "got {msg:?}");
        assert_eq!(msg.body(), body);
    }

    /// Asserts the server closes the connection without sending anything.
    pub async fn expect_closed(&mut self) {
        let next = self.recv().await;
        assert!(next.is_none(), "expected close, got {next:?}");
    }
}
