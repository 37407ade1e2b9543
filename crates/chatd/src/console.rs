//! Operator console commands.
//!
//! Each line typed on the server's stdin is parsed into an [`AdminCommand`]
//! and executed against the running [`ChatServer`].

use std::fmt::Write as _;

use chat_protocol::{ClientId, Message};

use crate::server::ChatServer;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Ban an identity and close its connection
    Ban(ClientId),
    /// Lift a ban
    Unban(ClientId),
    /// Show registered clients and bans
    List,
    /// Stop the server
    Shutdown,
    /// Broadcast text as the server
    Say(String),
}

/// Console input that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print the text and keep reading
    Continue(String),
    /// Shutdown has completed
    Stopped,
}

impl AdminCommand {
    /// Parses one console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();

        let parsed = match command.to_ascii_lowercase().as_str() {
            "ban" => Self::Ban(parse_identity(words, "ban <id>")?),
            "unban" => Self::Unban(parse_identity(words, "unban <id>")?),
            "list" if words.next().is_none() => Self::List,
            "shutdown" | "logout" if words.next().is_none() => Self::Shutdown,
            _ => Self::Say(line.to_string()),
        };

        Ok(Some(parsed))
    }
}

fn parse_identity<'a>(
    mut args: impl Iterator<Item = &'a str>,
    usage: &'static str,
) -> Result<ClientId, ConsoleError> {
    let raw = args.next().ok_or(ConsoleError::Usage(usage))?;
    if args.next().is_some() {
        return Err(ConsoleError::Usage(usage));
    }

    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConsoleError::Usage(usage)),
        Ok(id) => Ok(ClientId::new(id)),
    }
}

/// Runs a command and describes the result for the operator.
pub async fn execute(server: &ChatServer, command: AdminCommand) -> Outcome {
    match command {
        AdminCommand::Ban(identity) => match server.remove(identity).await {
            Ok(true) => Outcome::Continue(format!("banned {identity}, connection closed")),
            Ok(false) => Outcome::Continue(format!("banned {identity}")),
            Err(e) => Outcome::Continue(format!("ban failed: {e}")),
        },
        AdminCommand::Unban(identity) => match server.unban(identity).await {
            Ok(true) => Outcome::Continue(format!("unbanned {identity}")),
            Ok(false) => Outcome::Continue(format!("{identity} was not banned")),
            Err(e) => Outcome::Continue(format!("unban failed: {e}")),
        },
        AdminCommand::List => Outcome::Continue(render_listing(server).await),
        AdminCommand::Shutdown => {
            server.shutdown().await;
            Outcome::Stopped
        }
        AdminCommand::Say(text) => {
            match server.broadcast(&Message::ordinary(ClientId::SERVER, text)).await {
                Ok(delivery) => Outcome::Continue(format!("sent to {} client(s)", delivery.delivered)),
                Err(e) => Outcome::Continue(format!("broadcast failed: {e}")),
            }
        }
    }
}

async fn render_listing(server: &ChatServer) -> String {
    let clients = server.clients().await;
    let banned = server.banned().await;

    let mut out = format!("{} client(s) connected", clients.len());
    for client in &clients {
        let _ = write!(out, "\n  [{}] {}", client.identity, client.name);
    }

    if !banned.is_empty() {
        let ids: Vec<String> = banned.iter().map(ToString::to_string).collect();
        let _ = write!(out, "\nbanned: {}", ids.join(", "));
    }

    out
}
