//! Chat client library.
//!
//! - `client` - Server connection, event stream and sending
//! - `render` - Console formatting of received messages
//! - `error` - Client error type

pub mod client;
pub mod error;
pub mod render;

pub use client::{ChatClient, ChatSender, ClientConfig, ClientEvent};
pub use error::{ClientError, Result};
pub use render::{render_message, render_now};
