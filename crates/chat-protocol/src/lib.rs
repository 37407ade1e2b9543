//! Chat Protocol - Wire protocol for client/server communication
//!
//! This crate provides the message record exchanged between chat
//! clients and the server, and the newline-delimited JSON framing
//! used to move it over a byte stream.

pub mod message;
pub mod wire;

pub use message::{ClientId, Message, MessageType};
pub use wire::{read_message, write_message, ProtocolError, DEFAULT_MAX_MESSAGE_SIZE};
