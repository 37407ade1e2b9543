//! Ordered fan-out of messages to every registered client.
//!
//! Broadcasts are serialized under one ordering lock: a broadcast takes a
//! registry snapshot and writes to each live recipient before the next
//! broadcast starts, so two messages from the same sender reach every
//! common recipient in the order they were sent.
//!
//! Writes within one fan-out are sequential. A stalled recipient delays the
//! recipients after it in the same fan-out until its write completes or, if
//! a write deadline is configured, times out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use chat_protocol::{wire, ClientId, Message};

use crate::registry::{RegistryHandle, RemovalReason};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Number of recipients the message was written to
    pub delivered: usize,

    /// Recipients whose write failed; they have been removed
    pub failed: Vec<ClientId>,
}

/// Returned once the final broadcast has gone out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("broadcaster is closed")]
pub struct BroadcasterClosed;

/// Delivers messages to every registered client.
#[derive(Clone)]
pub struct Broadcaster {
    registry: RegistryHandle,

    /// Ordering lock; `true` once the final broadcast has been sent
    order: Arc<Mutex<bool>>,

    write_timeout: Option<Duration>,
}

impl Broadcaster {
    pub fn new(registry: RegistryHandle, write_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            order: Arc::new(Mutex::new(false)),
            write_timeout,
        }
    }

    /// Delivers `message` to every live registered client.
    ///
    /// A failed write to one recipient never aborts the fan-out: the
    /// recipient is terminated and unregistered and delivery continues.
    pub async fn broadcast(&self, message: &Message) -> Result<Delivery, BroadcasterClosed> {
        let closed = self.order.lock().await;
        if *closed {
            return Err(BroadcasterClosed);
        }
        Ok(self.fan_out(message).await)
    }

    /// Delivers `message` and closes the broadcaster.
    ///
    /// Broadcasts queued behind this one fail with [`BroadcasterClosed`], so
    /// nothing follows the final message on any connection.
    pub async fn broadcast_final(&self, message: &Message) -> Result<Delivery, BroadcasterClosed> {
        let mut closed = self.order.lock().await;
        if *closed {
            return Err(BroadcasterClosed);
        }
        let delivery = self.fan_out(message).await;
        *closed = true;
        Ok(delivery)
    }

    /// Returns true once the final broadcast has been sent.
    pub async fn is_closed(&self) -> bool {
        *self.order.lock().await
    }

    /// Writes to each recipient in identity order. Callers hold the ordering lock.
    async fn fan_out(&self, message: &Message) -> Delivery {
        let frame = match wire::encode_message(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode broadcast message");
                return Delivery::default();
            }
        };

        let recipients = self.registry.snapshot().await;
        let mut delivery = Delivery::default();

        for client in recipients.iter().filter(|c| c.is_live()) {
            match client.send_frame(&frame, self.write_timeout).await {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!(
                        identity = %client.identity(),
                        name = %client.name(),
                        error = %e,
                        "Failed to deliver message, dropping client"
                    );
                    client.terminate();
                    delivery.failed.push(client.identity());
                }
            }
        }

        for identity in &delivery.failed {
            self.registry
                .unregister(*identity, RemovalReason::WriteFailed)
                .await;
        }

        debug!(
            sender = %message.id(),
            kind = %message.kind(),
            delivered = delivery.delivered,
            failed = delivery.failed.len(),
            "Broadcast complete"
        );

        delivery
    }
}
