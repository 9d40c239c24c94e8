//! Participant: per-connection room membership
//!
//! Binds one connection to the rooms it has joined and turns decoded
//! envelopes into room operations. The participant's room map is the only
//! record of which rooms a connection is in; each room's member set is the
//! inverse index, and the two are updated together.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::AppError;
use crate::message::{ChatMessage, Envelope};
use crate::registry::Registry;
use crate::room::Room;
use crate::types::{ConnectionId, RoomName};

/// Membership state for one connection
#[derive(Debug)]
pub struct Participant {
    connection: Connection,
    identity: String,
    rooms: HashMap<RoomName, Room>,
}

impl Participant {
    pub fn new(connection: Connection) -> Self {
        let identity = connection.id().to_string();
        Self {
            connection,
            identity,
            rooms: HashMap::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Identity stamped on chat messages that arrive without a sender
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Names of the rooms currently joined
    pub fn rooms(&self) -> impl Iterator<Item = &RoomName> {
        self.rooms.keys()
    }

    /// Join a room
    ///
    /// Returns `false` without contacting the room if already a member.
    pub async fn join_room(&mut self, room: Room) -> Result<bool, AppError> {
        let name = room.name().clone();
        if self.rooms.contains_key(&name) {
            debug!("Connection {} already joined {}", self.id(), name);
            return Ok(false);
        }

        self.rooms.insert(name.clone(), room.clone());
        if let Err(e) = room.join(self.connection.clone()).await {
            self.rooms.remove(&name);
            return Err(e);
        }
        Ok(true)
    }

    /// Leave a room by name
    ///
    /// Returns `false` if the room was not joined.
    pub async fn leave_room(&mut self, name: &str) -> Result<bool, AppError> {
        let Some(room) = self.rooms.get(name) else {
            return Ok(false);
        };

        let result = room.leave(self.id()).await;
        self.rooms.remove(name);
        result.map(|()| true)
    }

    /// Leave every joined room
    ///
    /// Consumes the participant, so it runs at most once per connection.
    pub async fn on_disconnect(mut self) {
        let id = self.id();
        let rooms: Vec<(RoomName, Room)> = self.rooms.drain().collect();

        let results = join_all(rooms.iter().map(|(_, room)| room.leave(id))).await;
        for ((name, _), result) in rooms.iter().zip(results) {
            match result {
                Ok(()) => debug!("Connection {} left room {} due to connection close", id, name),
                Err(e) => warn!("Connection {} could not leave {}: {}", id, name, e),
            }
        }
    }

    /// Decode and dispatch one inbound frame
    ///
    /// Protocol and membership errors are logged and the frame dropped;
    /// the connection stays open.
    pub async fn handle_text(&mut self, text: &str, registry: &Registry) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Invalid envelope from {}: {}", self.id(), e);
                return;
            }
        };

        if let Err(e) = self.dispatch(envelope, registry).await {
            warn!("Rejected message from {}: {}", self.id(), e);
        }
    }

    /// Apply one envelope
    pub async fn dispatch(&mut self, envelope: Envelope, registry: &Registry) -> Result<(), AppError> {
        debug!("{} envelope from {}", envelope.kind(), self.id());
        match envelope {
            Envelope::Join { room } => {
                let handle = registry.get_or_create(&room).await;
                if self.join_room(handle).await? {
                    info!("Connection {} joined room: {}", self.id(), room);
                }
                Ok(())
            }
            Envelope::Leave { room } => {
                if self.leave_room(room.as_str()).await? {
                    info!("Connection {} left room: {}", self.id(), room);
                } else {
                    debug!("Connection {} left {} without joining", self.id(), room);
                }
                Ok(())
            }
            Envelope::Chat(chat) => self.chat(chat).await,
            Envelope::Unknown => {
                warn!("Unknown message type from {}", self.id());
                Ok(())
            }
        }
    }

    async fn chat(&mut self, mut chat: ChatMessage) -> Result<(), AppError> {
        let Some(room) = self.rooms.get(chat.room.as_str()) else {
            return Err(AppError::NotJoined(chat.room.to_string()));
        };

        chat.stamp(&self.identity);
        let room = room.clone();
        let payload: Arc<str> = Arc::from(Envelope::Chat(chat).encode()?);
        debug!("Broadcast in room {} from {}", room.name(), self.id());
        room.broadcast(Some(self.id()), payload).await
    }
}
