//! Server-side state for one connected client.
//!
//! A `ClientHandle` is cheap to clone: every clone shares the same
//! writer, liveness flag and termination token. The registry owns the
//! canonical copy; the connection handler and in-flight broadcasts hold
//! clones for as long as they need them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use chat_protocol::{wire, ClientId, ProtocolError};

/// Outbound half of a client connection.
pub type Outbound = Box<dyn AsyncWrite + Send + Unpin>;

/// Maximum display name length, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Errors writing to a single client.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("client {0} is no longer live")]
    NotLive(ClientId),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Identity and name of a registered client, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub identity: ClientId,
    pub name: String,
}

/// Handle to a registered client connection.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    identity: ClientId,
    name: String,
    writer: Mutex<BufWriter<Outbound>>,
    live: AtomicBool,
    terminate: CancellationToken,
}

impl ClientHandle {
    /// Creates a live handle around the outbound half of a connection.
    pub fn new(identity: ClientId, name: impl Into<String>, writer: Outbound) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                identity,
                name: name.into(),
                writer: Mutex::new(BufWriter::new(writer)),
                live: AtomicBool::new(true),
                terminate: CancellationToken::new(),
            }),
        }
    }

    pub fn identity(&self) -> ClientId {
        self.inner.identity
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            identity: self.identity(),
            name: self.name().to_string(),
        }
    }

    /// Returns true until the handle is torn down.
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Marks the handle non-live and signals its handler to stop.
    ///
    /// Safe to call any number of times from any task.
    pub fn terminate(&self) {
        self.inner.live.store(false, Ordering::Release);
        self.inner.terminate.cancel();
    }

    /// Resolves once [`terminate`](Self::terminate) has been called.
    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.inner.terminate.cancelled()
    }

    /// Writes one encoded frame to the client.
    ///
    /// With `deadline` set, a write that does not complete in time fails
    /// with [`SendError::Timeout`].
    pub async fn send_frame(
        &self,
        frame: &[u8],
        deadline: Option<Duration>,
    ) -> Result<(), SendError> {
        if !self.is_live() {
            return Err(SendError::NotLive(self.identity()));
        }

        let mut writer = self.inner.writer.lock().await;
        match deadline {
            Some(limit) => timeout(limit, wire::write_frame(&mut *writer, frame))
                .await
                .map_err(|_| SendError::Timeout(limit))?
                .map_err(SendError::from),
            None => wire::write_frame(&mut *writer, frame)
                .await
                .map_err(SendError::from),
        }
    }

    /// Tears the handle down and shuts the outbound half of the connection.
    ///
    /// The handler task drops the inbound half once it observes termination,
    /// which completes the close.
    pub async fn close(&self) {
        self.terminate();

        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(identity = %self.identity(), error = %e, "Error shutting down client writer");
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("identity", &self.inner.identity)
            .field("name", &self.inner.name)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Normalizes a requested display name.
///
/// Returns `None` if the trimmed name is empty or longer than
/// [`MAX_NAME_LEN`] characters.
pub fn normalize_name(requested: &str) -> Option<String> {
    let name = requested.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return None;
    }
    Some(name.to_string())
}
