//! Chat message types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identity of a client connection.
///
/// Identities are handed out monotonically and never reused within
/// one server process. `ClientId::SERVER` (0) is reserved for messages
/// the server originates itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Identity stamped on server-originated messages.
    pub const SERVER: ClientId = ClientId(0);

    /// Placeholder a client stamps on what it sends.
    ///
    /// A client does not know its own identity; the server replaces this
    /// with the connection's identity before relaying.
    pub const UNASSIGNED: ClientId = ClientId(0);

    /// Creates an identity from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true for the reserved server identity.
    pub const fn is_server(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Kind of a chat message. The kind alone dictates how a message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// User text, relayed to every client
    Ordinary,

    /// Client is disconnecting voluntarily
    Logout,

    /// Server is shutting down; nothing follows on the connection
    Shutdown,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinary => write!(f, "ordinary"),
            Self::Logout => write!(f, "logout"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// A chat message.
///
/// Fields are private so a message cannot change after construction;
/// the server re-stamps the sender identity by building a new message
/// with [`Message::with_sender`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: ClientId,

    #[serde(rename = "type")]
    kind: MessageType,

    #[serde(default)]
    body: String,
}

impl Message {
    /// Creates a message.
    pub fn new(id: ClientId, kind: MessageType, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    /// Creates an ordinary text message.
    pub fn ordinary(id: ClientId, body: impl Into<String>) -> Self {
        Self::new(id, MessageType::Ordinary, body)
    }

    /// Creates a logout message.
    pub fn logout(id: ClientId) -> Self {
        Self::new(id, MessageType::Logout, String::new())
    }

    /// Creates the server shutdown notice.
    pub fn shutdown() -> Self {
        Self::new(ClientId::SERVER, MessageType::Shutdown, String::new())
    }

    /// Creates the identification message a client sends right after connecting.
    pub fn hello(display_name: impl Into<String>) -> Self {
        Self::ordinary(ClientId::UNASSIGNED, display_name)
    }

    /// Returns a copy of this message attributed to `sender`.
    pub fn with_sender(&self, sender: ClientId) -> Self {
        Self {
            id: sender,
            kind: self.kind,
            body: self.body.clone(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::ordinary(ClientId::new(7), "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"type\":\"ordinary\""));
        assert!(json.contains("\"body\":\"hi\""));
    }

    #[test]
    fn test_missing_body_defaults_to_empty() {
        let msg: Message = serde_json::from_str(r#"{"id":3,"type":"logout"}"#).unwrap();
        assert_eq!(msg.kind(), MessageType::Logout);
        assert_eq!(msg.body(), "");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = serde_json::from_str::<Message>(r#"{"id":1,"type":"kick","body":""}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_sender_restamps_identity() {
        let original = Message::ordinary(ClientId::new(99), "spoofed");
        let stamped = original.with_sender(ClientId::new(4));
        assert_eq!(stamped.id(), ClientId::new(4));
        assert_eq!(stamped.body(), "spoofed");
        assert_eq!(original.id(), ClientId::new(99));
    }

    #[test]
    fn test_shutdown_comes_from_server() {
        let msg = Message::shutdown();
        assert!(msg.id().is_server());
        assert_eq!(msg.kind(), MessageType::Shutdown);
        assert!(msg.body().is_empty());
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::Ordinary.to_string(), "ordinary");
        assert_eq!(MessageType::Logout.to_string(), "logout");
        assert_eq!(MessageType::Shutdown.to_string(), "shutdown");
    }
}
