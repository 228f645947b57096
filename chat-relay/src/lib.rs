//! Line-oriented TCP chat relay.
//!
//! Clients connect, pick a unique username, and every line they send is
//! relayed to all other connected clients. Each module covers one piece:
//!
//! - [`server`] accepts TCP connections and spawns a dispatch loop per client.
//! - [`connection`] is that dispatch loop: registration, relaying, teardown.
//! - [`registry`] holds the active sessions and fans messages out to them.
//! - [`session`] is one client's identity and single-slot outbox.
//! - [`reader`] decodes a raw byte stream into message lines.
//! - [`message`] builds the plain-text lines written to clients.
//! - [`cli`] parses the listen address.

pub mod cli;
pub mod connection;
pub mod message;
pub mod reader;
pub mod registry;
pub mod server;
pub mod session;
