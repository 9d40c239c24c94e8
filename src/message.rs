//! Message protocol definitions
//!
//! JSON envelopes exchanged in both directions, using Serde's tagged enum
//! for type-safe serialization/deserialization:
//!
//! ```json
//! {"type": "chat", "room": "lobby", "content": "hi", "sender": "alice",
//!  "timestamp": "2024-05-01T12:00:00Z"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::RoomName;

/// Wire envelope
///
/// `room` is required for join, leave and chat. Any other `type` value
/// decodes to `Unknown` so the caller can reject it without dropping the
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Join (creating if needed) the named room
    Join { room: RoomName },
    /// Leave the named room
    Leave { room: RoomName },
    /// Chat message for the named room
    Chat(ChatMessage),
    /// Unrecognized `type` tag
    #[serde(other)]
    Unknown,
}

/// Chat payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room: RoomName,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// Message timestamp
///
/// Accepts either an RFC 3339 string or an integer count of milliseconds
/// since the Unix epoch, and re-emits it in the same form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Rfc3339(DateTime<Utc>),
    EpochMillis(i64),
}

impl Timestamp {
    pub fn now() -> Self {
        Timestamp::Rfc3339(Utc::now())
    }
}

impl ChatMessage {
    pub fn new(room: impl Into<RoomName>, content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            content: content.into(),
            sender: sender.into(),
            timestamp: None,
        }
    }

    /// Fill in what the client left out before fan-out
    ///
    /// An empty sender becomes `identity`; a missing timestamp becomes now.
    pub fn stamp(&mut self, identity: &str) {
        if self.sender.is_empty() {
            self.sender = identity.to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Timestamp::now());
        }
    }
}

impl Envelope {
    /// Decode one envelope from a text frame
    pub fn decode(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode to the JSON wire form
    pub fn encode(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Join { .. } => "join",
            Envelope::Leave { .. } => "leave",
            Envelope::Chat(_) => "chat",
            Envelope::Unknown => "unknown",
        }
    }
}
