//! Room registry
//!
//! Process-wide mapping from room name to running room. Rooms are created
//! lazily on first join, or explicitly through the admin route, and are
//! never removed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::RegistryError;
use crate::room::{Room, RoomConfig};
use crate::types::RoomName;

/// Name → room lookup shared by every connection
///
/// Cheap to clone; clones share the same table. Construct one per server
/// (or per test) and pass it where it is needed.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rooms: Arc<RwLock<HashMap<RoomName, Room>>>,
    config: RoomConfig,
}

impl Registry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Return the room for `name`, creating and starting it if absent
    ///
    /// Check-and-create runs under the write lock, so concurrent first
    /// references to the same name all receive the same room.
    pub async fn get_or_create(&self, name: &RoomName) -> Room {
        if let Some(room) = self.get(name).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(name.clone())
            .or_insert_with(|| {
                info!("Room {} created", name);
                Room::spawn(name.clone(), self.config)
            })
            .clone()
    }

    /// Create a room, failing if the name is taken
    pub async fn create(&self, name: &RoomName) -> Result<Room, RegistryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        let room = Room::spawn(name.clone(), self.config);
        rooms.insert(name.clone(), room.clone());
        info!("Room {} created", name);
        Ok(room)
    }

    pub async fn get(&self, name: &RoomName) -> Option<Room> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Snapshot of the current room names, in no particular order
    pub async fn list(&self) -> Vec<RoomName> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    #[tokio::test]
    async fn test_get_or_create_reuses_room() {
        let registry = Registry::default();
        let name = RoomName::from("r1");

        let first = registry.get_or_create(&name).await;
        let second = registry.get_or_create(&name).await;

        assert!(first.same_room(&second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let registry = Registry::default();
        let name = RoomName::from("lobby");

        registry.create(&name).await.unwrap();
        assert_eq!(
            registry.create(&name).await.unwrap_err(),
            RegistryError::AlreadyExists("lobby".to_string())
        );
        assert_eq!(registry.list().await, vec![name]);
    }

    #[tokio::test]
    async fn test_create_then_get_or_create() {
        let registry = Registry::default();
        let name = RoomName::from("lobby");

        let created = registry.create(&name).await.unwrap();
        let found = registry.get_or_create(&name).await;
        assert!(created.same_room(&found));
    }

    #[tokio::test]
    async fn test_list_snapshot() {
        let registry = Registry::default();
        assert!(registry.is_empty().await);

        registry.get_or_create(&RoomName::from("b")).await;
        registry.get_or_create(&RoomName::from("a")).await;

        let mut names = registry.list().await;
        names.sort();
        assert_eq!(names, vec![RoomName::from("a"), RoomName::from("b")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_joins_create_one_room() {
        let registry = Registry::default();
        let name = RoomName::from("race");
        let n = 32;

        let mut tasks = Vec::new();
        for _ in 0..n {
            let registry = registry.clone();
            let name = name.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, mailbox) = Connection::new(4);
                let room = registry.get_or_create(&name).await;
                room.join(conn.clone()).await.unwrap();
                (room, conn, mailbox)
            }));
        }

        let mut joined = Vec::new();
        for task in tasks {
            joined.push(task.await.unwrap());
        }

        assert_eq!(registry.len().await, 1);
        let room = registry.get(&name).await.unwrap();
        for (r, _, _) in &joined {
            assert!(r.same_room(&room));
        }

        let members = room.members().await.unwrap();
        assert_eq!(members.len(), n);
        for (_, conn, _) in &joined {
            assert!(members.contains(&conn.id()));
        }
    }
}
