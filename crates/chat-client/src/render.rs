//! Console rendering of incoming messages.

use chrono::{DateTime, Local, TimeZone};

use chat_protocol::Message;

/// Formats a received message as `HH:MM:SS [id] body`.
///
/// Messages from the server identity render as `[server]`.
pub fn render_message<Tz>(message: &Message, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let time = at.format("%H:%M:%S");
    if message.id().is_server() {
        format!("{time} [server] {}", message.body())
    } else {
        format!("{time} [{}] {}", message.id(), message.body())
    }
}

/// Formats a received message stamped with the local time.
pub fn render_now(message: &Message) -> String {
    render_message(message, &Local::now())
}
