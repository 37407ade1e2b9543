//! chatd - Multi-client chat server
//!
//! Relays every chat message to every connected client. The operator
//! console on stdin accepts `ban <id>`, `unban <id>`, `list` and
//! `shutdown`; any other line is broadcast as a server message.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (1500)
//! chatd
//!
//! # Custom port and client limit
//! chatd --port 4000 --max-clients 32
//!
//! # Load settings from a file, then override the host
//! chatd --config chatd.toml --host 127.0.0.1
//! ```

use std::env;
use std::io::BufRead;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chatd::config::ServerConfig;
use chatd::console::{self, AdminCommand, Outcome};
use chatd::registry::RegistryEvent;
use chatd::server::ChatServer;

/// chatd - multi-client chat server
#[derive(Parser, Debug)]
#[command(name = "chatd", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind [env: CHAT_HOST]
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on [env: CHAT_PORT]
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum number of connected clients
    #[arg(long)]
    max_clients: Option<usize>,

    /// Per-client write deadline during broadcast, in milliseconds
    #[arg(long)]
    write_timeout_ms: Option<u64>,
}

impl Args {
    /// Resolves settings: flag, then environment, then file, then default.
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Ok(host) = env::var("CHAT_HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("CHAT_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("CHAT_PORT is not a valid port: {port}"))?;
        }

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        if let Some(ms) = self.write_timeout_ms {
            config.write_timeout_ms = Some(ms);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chatd=info".parse()?)
                .add_directive("chat_protocol=info".parse()?),
        )
        .init();

    let config = Args::parse().into_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "chatd starting"
    );

    let server = ChatServer::startup(config)
        .await
        .context("Failed to start chat server")?;
    println!("Listening on {}", server.local_addr());

    spawn_event_logger(&server);

    let signal_server = server.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_server.shutdown().await;
    });

    let console_server = server.clone();
    tokio::spawn(async move { run_console(console_server).await });

    server.wait_for_shutdown().await;
    info!("chatd stopped");
    Ok(())
}

/// Forwards stdin lines from a dedicated thread.
///
/// The thread is detached; it never holds up process exit.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    break;
                }
            }
        }
    });
    rx
}

/// Runs operator commands until shutdown or end of input.
async fn run_console(server: ChatServer) {
    let mut lines = spawn_stdin_reader();

    while let Some(line) = lines.recv().await {
        let command = match AdminCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match console::execute(&server, command).await {
            Outcome::Continue(text) => println!("{text}"),
            Outcome::Stopped => return,
        }
    }

    // Detached from a terminal; keep serving until a signal
    info!("Console input closed");
}

/// Logs registry events as clients come and go.
fn spawn_event_logger(server: &ChatServer) {
    let mut events = server.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::Joined { identity, name }) => {
                    println!("{name} joined as [{identity}]");
                }
                Ok(RegistryEvent::Left {
                    identity,
                    name,
                    reason,
                }) => {
                    println!("{name} [{identity}] left ({reason})");
                }
                Ok(RegistryEvent::Banned { identity }) => {
                    info!(identity = %identity, "Banned");
                }
                Ok(RegistryEvent::Unbanned { identity }) => {
                    info!(identity = %identity, "Unbanned");
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event logger lagged, skipped events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
