//! chat - Console chat client
//!
//! Every line typed is sent to the server. Incoming messages print as
//! `HH:MM:SS [id] text`.
//!
//! # Usage
//!
//! ```text
//! chat alice                    # connect to localhost:1500 as "alice"
//! chat bob --host chat.lan -p 4000
//! ```
//!
//! Type `logout` to leave.

use std::io::BufRead;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use chat_client::{render_now, ChatClient, ClientConfig, ClientEvent};

// ============================================================================
// CLI Arguments
// ============================================================================

/// chat - console chat client
#[derive(Parser, Debug)]
#[command(name = "chat", version, about)]
struct Args {
    /// Display name to join with
    nickname: String,

    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 1500)]
    port: u16,
}

// ============================================================================
// Main Loop
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_client=warn".parse()?)
                .add_directive("chat_protocol=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        host: args.host,
        port: args.port,
        nickname: args.nickname,
        ..Default::default()
    };

    let client = ChatClient::connect(&config)
        .await
        .with_context(|| format!("Could not join {}", config.address()))?;
    println!("Connected to {} as {}. Type 'logout' to leave.", config.address(), config.nickname.trim());

    let (mut sender, mut events) = client.split();
    let mut input = spawn_stdin_reader();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Message(msg)) => println!("{}", render_now(&msg)),
                Some(ClientEvent::ServerShutdown) => {
                    println!("Server is shutting down.");
                    return Ok(());
                }
                Some(ClientEvent::Disconnected) | None => {
                    println!("Disconnected from server.");
                    return Ok(());
                }
            },

            line = input.recv() => match line {
                Some(line) if line.trim().eq_ignore_ascii_case("logout") => break,
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(e) = sender.send(&line).await {
                        warn!(error = %e, "Send failed");
                        println!("Disconnected from server.");
                        return Ok(());
                    }
                }
                // End of input behaves like logout
                None => break,
            },
        }
    }

    sender.logout().await.context("Logout failed")?;
    println!("Logged out.");
    Ok(())
}

/// Forwards stdin lines from a dedicated thread.
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
                    warn!(error = %e, "Input read failed");
                    break;
                }
            }
        }
    });
    rx
}
