//! Chat Daemon - Client registry and broadcast server
//!
//! This crate provides the core infrastructure for the chat server:
//! - `registry` - Client registry actor tracking live connections and bans
//! - `server` - TCP acceptor, per-client handlers, broadcaster and controller
//! - `console` - Operator commands (`ban`, `unban`, `list`, `shutdown`)
//! - `config` - Server configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        chatd server                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionAccept.│────▶│     RegistryActor           │   │
//! │  │ (TcpListener)   │     │ (clients, names, bans)      │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │ snapshot          │
//! │           │ spawn                       │                   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ConnectionHandler│────▶│       Broadcaster           │   │
//! │  │  (per client)   │     │ (ordered fan-out)           │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod console;
pub mod registry;
pub mod server;
