//! Error types for the broadcast server
//!
//! Defines application-level errors, mailbox send errors and registry
//! errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Transport errors are fatal for the connection they occur on. Protocol
/// and membership errors are logged and the offending message dropped.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket transport error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary frame that is not valid UTF-8
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    /// Chat or leave for a room the participant has not joined
    #[error("Not joined to room: {0}")]
    NotJoined(String),

    /// The room's actor is no longer running
    #[error("Room unavailable: {0}")]
    RoomUnavailable(String),
}

/// Mailbox send errors
///
/// Returned by a non-blocking enqueue onto a connection's mailbox.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The mailbox is at capacity; the consumer is not keeping up
    #[error("Mailbox full")]
    Full,

    /// The connection is closing or closed
    #[error("Channel closed")]
    Closed,
}

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Explicit creation of a room whose name is already taken
    #[error("Room already exists: {0}")]
    AlreadyExists(String),
}
