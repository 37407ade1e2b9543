//! Client registry using Actor pattern.
//!
//! The registry is the single source of truth for who is connected and who
//! may connect. It receives commands via a tokio mpsc channel, so every
//! registration, removal, ban and snapshot is serialized with respect to
//! every other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Acceptor/Handler│────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   RegistryEvent       │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!   Register/Unregister    BTreeMap<ClientId,      Operator console
//!   Ban/Unban/Snapshot     ClientHandle>           and tests
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod client;
mod commands;
mod handle;

pub use actor::{RegistryActor, MAX_CLIENTS};
pub use client::{normalize_name, ClientHandle, ClientInfo, Outbound, SendError, MAX_NAME_LEN};
pub use commands::{RegistryCommand, RegistryError, RegistryEvent, RemovalReason};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor runs until every `RegistryHandle` clone has been dropped.
///
/// # Example
///
/// ```no_run
/// use chatd::registry::{spawn_registry, MAX_CLIENTS};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(MAX_CLIENTS);
///     let clients = handle.list().await;
/// }
/// ```
pub fn spawn_registry(max_clients: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_clients);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
