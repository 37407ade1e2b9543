//! Registry actor - owns all client state and processes commands.
//!
//! The RegistryActor is the single owner of the live-client maps and the
//! banned set. It receives commands via an mpsc channel and publishes
//! events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use chat_protocol::ClientId;

use super::client::{normalize_name, ClientHandle, ClientInfo, Outbound};
use super::commands::{RegistryCommand, RegistryError, RegistryEvent, RemovalReason};

/// Default maximum number of clients the registry holds at once.
pub const MAX_CLIENTS: usize = 256;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all client state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Ownership
///
/// The actor owns:
/// - `by_identity`: registered handles, ordered by identity
/// - `by_name`: display name → identity index, used to reject duplicates
/// - `banned`: identities refused admission
///
/// Every identity in `by_name` has an entry in `by_identity`, and no banned
/// identity has one once a `Ban` command has been processed.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// All state mutations happen within this single task.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Registered clients keyed by identity
    by_identity: BTreeMap<ClientId, ClientHandle>,

    /// Display name index
    by_name: HashMap<String, ClientId>,

    /// Banned identities
    banned: BTreeSet<ClientId>,

    /// Set once shutdown has begun; registrations are refused afterwards
    sealed: bool,

    /// Capacity limit
    max_clients: usize,

    /// Event publisher for the operator console and tests
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    /// * `max_clients` - Maximum number of simultaneously registered clients
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        max_clients: usize,
    ) -> Self {
        Self {
            receiver,
            by_identity: BTreeMap::new(),
            by_name: HashMap::new(),
            banned: BTreeSet::new(),
            sealed: false,
            max_clients,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!(max_clients = self.max_clients, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            "Registry actor stopped (clients: {}, banned: {})",
            self.by_identity.len(),
            self.banned.len()
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                identity,
                name,
                writer,
                respond_to,
            } => {
                let result = self.handle_register(identity, &name, writer);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unregister {
                identity,
                reason,
                respond_to,
            } => {
                let result = self.handle_unregister(identity, reason);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Ban {
                identity,
                respond_to,
            } => {
                let result = self.handle_ban(identity);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unban {
                identity,
                respond_to,
            } => {
                let result = self.handle_unban(identity);
                let _ = respond_to.send(result);
            }
            RegistryCommand::IsBanned {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.banned.contains(&identity));
            }
            RegistryCommand::Get {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.by_identity.get(&identity).cloned());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.by_identity.values().cloned().collect());
            }
            RegistryCommand::List { respond_to } => {
                let _ = respond_to.send(self.handle_list());
            }
            RegistryCommand::Banned { respond_to } => {
                let _ = respond_to.send(self.banned.iter().copied().collect());
            }
            RegistryCommand::BeginShutdown { respond_to } => {
                if !self.sealed {
                    info!(clients = self.by_identity.len(), "Registry sealed for shutdown");
                }
                self.sealed = true;
                let _ = respond_to.send(());
            }
            RegistryCommand::Drain { respond_to } => {
                let result = self.handle_drain();
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles client registration.
    fn handle_register(
        &mut self,
        identity: ClientId,
        requested: &str,
        writer: Outbound,
    ) -> Result<ClientHandle, RegistryError> {
        if self.sealed {
            debug!(identity = %identity, "Registration refused: shutting down");
            return Err(RegistryError::ShuttingDown);
        }

        if self.banned.contains(&identity) {
            warn!(identity = %identity, "Registration refused: identity is banned");
            return Err(RegistryError::Banned(identity));
        }

        if self.by_identity.contains_key(&identity) {
            warn!(identity = %identity, "Registration refused: identity already registered");
            return Err(RegistryError::DuplicateIdentity(identity));
        }

        let name = normalize_name(requested)
            .ok_or_else(|| RegistryError::InvalidName(requested.to_string()))?;

        if self.by_name.contains_key(&name) {
            warn!(identity = %identity, name = %name, "Registration refused: name in use");
            return Err(RegistryError::NameConflict(name));
        }

        if self.by_identity.len() >= self.max_clients {
            warn!(
                identity = %identity,
                current = self.by_identity.len(),
                max = self.max_clients,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_clients,
            });
        }

        let handle = ClientHandle::new(identity, name.clone(), writer);
        self.by_name.insert(name.clone(), identity);
        self.by_identity.insert(identity, handle.clone());

        debug!(identity = %identity, name = %name, clients = self.by_identity.len(), "Client registered");

        let _ = self
            .event_publisher
            .send(RegistryEvent::Joined { identity, name });

        Ok(handle)
    }

    /// Removes a client from both maps.
    ///
    /// The caller owns the connection and is responsible for closing it.
    fn handle_unregister(
        &mut self,
        identity: ClientId,
        reason: RemovalReason,
    ) -> Option<ClientHandle> {
        let handle = self.by_identity.remove(&identity)?;

        // Only drop the name index entry if it still points at this identity
        if self.by_name.get(handle.name()) == Some(&identity) {
            self.by_name.remove(handle.name());
        }

        debug!(
            identity = %identity,
            name = %handle.name(),
            reason = %reason,
            clients = self.by_identity.len(),
            "Client unregistered"
        );

        let _ = self.event_publisher.send(RegistryEvent::Left {
            identity,
            name: handle.name().to_string(),
            reason,
        });

        Some(handle)
    }

    /// Bans an identity and terminates its handle if registered.
    fn handle_ban(&mut self, identity: ClientId) -> Option<ClientHandle> {
        let newly_banned = self.banned.insert(identity);
        if newly_banned {
            info!(identity = %identity, "Identity banned");
            let _ = self.event_publisher.send(RegistryEvent::Banned { identity });
        }

        let handle = self.handle_unregister(identity, RemovalReason::Banned)?;
        handle.terminate();
        Some(handle)
    }

    /// Lifts a ban. Registered clients are unaffected.
    fn handle_unban(&mut self, identity: ClientId) -> bool {
        let removed = self.banned.remove(&identity);
        if removed {
            info!(identity = %identity, "Identity unbanned");
            let _ = self
                .event_publisher
                .send(RegistryEvent::Unbanned { identity });
        }
        removed
    }

    fn handle_list(&self) -> Vec<ClientInfo> {
        self.by_identity.values().map(ClientHandle::info).collect()
    }

    /// Removes every handle, clearing both maps.
    fn handle_drain(&mut self) -> Vec<ClientHandle> {
        let drained: Vec<ClientHandle> = std::mem::take(&mut self.by_identity)
            .into_values()
            .collect();
        self.by_name.clear();

        for handle in &drained {
            let _ = self.event_publisher.send(RegistryEvent::Left {
                identity: handle.identity(),
                name: handle.name().to_string(),
                reason: RemovalReason::Shutdown,
            });
        }

        debug!(drained = drained.len(), "Registry drained");
        drained
    }

    // ========================================================================
    // Test Helpers
    // ========================================================================

    /// Returns the number of registered clients (test helper).
    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.by_identity.len()
    }

    /// Checks the map invariant (test helper).
    #[cfg(test)]
    fn indexes_consistent(&self) -> bool {
        self.by_name.len() == self.by_identity.len()
            && self
                .by_name
                .iter()
                .all(|(name, id)| self.by_identity.get(id).is_some_and(|h| h.name() == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::sync::oneshot;

    fn create_actor() -> (RegistryActor, broadcast::Receiver<RegistryEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        (RegistryActor::new(cmd_rx, event_tx, 4), event_rx)
    }

    fn writer() -> Outbound {
        let (server_side, _client_side) = duplex(64);
        Box::new(server_side)
    }

    #[tokio::test]
    async fn test_register_client() {
        let (mut actor, mut events) = create_actor();

        let handle = actor
            .handle_register(ClientId::new(1), "alice", writer())
            .unwrap();
        assert_eq!(handle.identity(), ClientId::new(1));
        assert_eq!(handle.name(), "alice");
        assert_eq!(actor.client_count(), 1);
        assert!(actor.indexes_consistent());

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Joined {
                identity: ClientId::new(1),
                name: "alice".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_register_duplicate_name_fails() {
        let (mut actor, _events) = create_actor();

        actor.handle_register(ClientId::new(1), "alice", writer()).unwrap();
        let result = actor.handle_register(ClientId::new(2), " alice ", writer());

        assert_eq!(result.unwrap_err(), RegistryError::NameConflict("alice".to_string()));
        assert_eq!(actor.client_count(), 1);
        assert!(actor.indexes_consistent());
    }

    #[tokio::test]
    async fn test_register_reused_identity_fails() {
        let (mut actor, _events) = create_actor();

        actor.handle_register(ClientId::new(1), "alice", writer()).unwrap();
        let result = actor.handle_register(ClientId::new(1), "bob", writer());

        assert_eq!(result.unwrap_err(), RegistryError::DuplicateIdentity(ClientId::new(1)));
        assert_eq!(actor.client_count(), 1);
        assert!(actor.indexes_consistent());

        // Removing the identity frees the original name
        actor.handle_unregister(ClientId::new(1), RemovalReason::Logout);
        assert!(actor.indexes_consistent());
        assert!(actor.handle_register(ClientId::new(2), "alice", writer()).is_ok());
        assert!(actor.handle_register(ClientId::new(3), "bob", writer()).is_ok());
    }

    #[tokio::test]
    async fn test_register_invalid_name_fails() {
        let (mut actor, _events) = create_actor();
        let result = actor.handle_register(ClientId::new(1), "   ", writer());
        assert!(matches!(result, Err(RegistryError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_max_clients_limit() {
        let (mut actor, _events) = create_actor();

        for i in 1..=4 {
            actor
                .handle_register(ClientId::new(i), &format!("user-{i}"), writer())
                .unwrap();
        }

        let result = actor.handle_register(ClientId::new(5), "user-5", writer());
        assert_eq!(result.unwrap_err(), RegistryError::RegistryFull { max: 4 });
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (mut actor, _events) = create_actor();
        actor.handle_register(ClientId::new(1), "alice", writer()).unwrap();

        assert!(actor
            .handle_unregister(ClientId::new(1), RemovalReason::Logout)
            .is_some());
        assert!(actor
            .handle_unregister(ClientId::new(1), RemovalReason::Logout)
            .is_none());
        assert_eq!(actor.client_count(), 0);
        assert!(actor.indexes_consistent());

        // Name is free again
        assert!(actor.handle_register(ClientId::new(2), "alice", writer()).is_ok());
    }

    #[tokio::test]
    async fn test_ban_terminates_registered_client() {
        let (mut actor, _events) = create_actor();
        let handle = actor.handle_register(ClientId::new(1), "bob", writer()).unwrap();

        let removed = actor.handle_ban(ClientId::new(1)).unwrap();
        assert_eq!(removed.identity(), ClientId::new(1));
        assert!(!handle.is_live());
        assert!(actor.banned.contains(&ClientId::new(1)));
        assert!(!actor.by_identity.contains_key(&ClientId::new(1)));
        assert!(actor.indexes_consistent());
    }

    #[tokio::test]
    async fn test_ban_unknown_identity_predeclares() {
        let (mut actor, _events) = create_actor();

        assert!(actor.handle_ban(ClientId::new(9)).is_none());

        let result = actor.handle_register(ClientId::new(9), "carol", writer());
        assert_eq!(result.unwrap_err(), RegistryError::Banned(ClientId::new(9)));
    }

    #[tokio::test]
    async fn test_unban_only_affects_admission() {
        let (mut actor, _events) = create_actor();
        actor.handle_register(ClientId::new(1), "dave", writer()).unwrap();
        actor.handle_ban(ClientId::new(1));

        assert!(actor.handle_unban(ClientId::new(1)));
        assert!(!actor.handle_unban(ClientId::new(1)));

        // Still gone; unban does not resurrect the session
        assert_eq!(actor.client_count(), 0);
    }

    #[tokio::test]
    async fn test_sealed_registry_refuses() {
        let (mut actor, _events) = create_actor();
        actor.handle_register(ClientId::new(1), "erin", writer()).unwrap();

        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::BeginShutdown { respond_to: tx });
        rx.await.unwrap();

        let result = actor.handle_register(ClientId::new(2), "frank", writer());
        assert_eq!(result.unwrap_err(), RegistryError::ShuttingDown);

        let drained = actor.handle_drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(actor.client_count(), 0);
        assert!(actor.indexes_consistent());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_identity() {
        let (mut actor, _events) = create_actor();
        actor.handle_register(ClientId::new(3), "c", writer()).unwrap();
        actor.handle_register(ClientId::new(1), "a", writer()).unwrap();
        actor.handle_register(ClientId::new(2), "b", writer()).unwrap();

        let ids: Vec<u64> = actor.handle_list().iter().map(|c| c.identity.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
