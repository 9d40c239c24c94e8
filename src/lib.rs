//! Multi-room WebSocket Broadcast Server Library
//!
//! Clients connect over a WebSocket, join named rooms, and send chat
//! messages that the server fans out to the other members of the room.
//!
//! # Architecture
//! - `Connection` owns a bounded outbound mailbox drained by a write task
//! - `Participant` tracks which rooms one connection has joined and
//!   dispatches inbound envelopes
//! - `Room` is an actor: one task per room owns its member set and handles
//!   join, leave and broadcast strictly in order
//! - `Registry` maps room names to rooms, creating them on first use
//!
//! A member whose mailbox is full when a broadcast arrives is closed and
//! evicted, so a slow client never stalls the rest of its room.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use roomcast::{serve, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     serve(listener, AppState::new(config)).await.unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod participant;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use connection::{Connection, ConnectionState, Mailbox};
pub use error::{AppError, RegistryError, SendError};
pub use handler::handle_socket;
pub use message::{ChatMessage, Envelope, Timestamp};
pub use participant::Participant;
pub use registry::Registry;
pub use room::{EchoPolicy, Room, RoomConfig};
pub use server::{router, serve, AppState};
pub use types::{ConnectionId, RoomName};
