//! Room actor implementation
//!
//! Each room is a single task that owns the room's member set and
//! processes join, leave and broadcast requests one at a time from its
//! command channel. Nothing else touches the member set, so no two
//! mutations interleave and a broadcast always sees a consistent set.
//!
//! Broadcast never waits on a member: delivery is a non-blocking enqueue
//! onto the member's mailbox, and a member whose mailbox is full is closed
//! and evicted in the same step.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{Connection, Outbound};
use crate::error::{AppError, SendError};
use crate::types::{ConnectionId, RoomName};

/// Whether a sender receives its own broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Deliver to every member except the sender
    #[default]
    SkipSender,
    /// Deliver to every member, sender included
    IncludeSender,
}

/// Per-room settings, shared by every room a registry creates
#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    /// Capacity of the room's command channel
    pub inbox_capacity: usize,
    pub echo: EchoPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 256,
            echo: EchoPolicy::default(),
        }
    }
}

/// Commands processed by a room actor
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a member (no-op if present)
    Join(Connection),
    /// Remove a member (no-op if absent)
    Leave(ConnectionId),
    /// Fan a message out to the members
    Broadcast {
        from: Option<ConnectionId>,
        payload: Outbound,
    },
    /// Snapshot of the current member ids
    Members(oneshot::Sender<Vec<ConnectionId>>),
}

/// Handle to a running room
///
/// Cloning the handle does not create a new room; all clones feed the same
/// actor. The actor stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct Room {
    name: RoomName,
    commands: mpsc::Sender<RoomCommand>,
}

impl Room {
    /// Create a room and start its actor on the current runtime
    pub fn spawn(name: RoomName, config: RoomConfig) -> Self {
        let (commands, receiver) = mpsc::channel(config.inbox_capacity.max(1));
        let actor = RoomActor::new(name.clone(), receiver, config.echo);
        tokio::spawn(actor.run());
        Self { name, commands }
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// True if both handles drive the same actor
    pub fn same_room(&self, other: &Room) -> bool {
        self.commands.same_channel(&other.commands)
    }

    pub async fn join(&self, member: Connection) -> Result<(), AppError> {
        self.send(RoomCommand::Join(member)).await
    }

    pub async fn leave(&self, member: ConnectionId) -> Result<(), AppError> {
        self.send(RoomCommand::Leave(member)).await
    }

    pub async fn broadcast(
        &self,
        from: Option<ConnectionId>,
        payload: Outbound,
    ) -> Result<(), AppError> {
        self.send(RoomCommand::Broadcast { from, payload }).await
    }

    /// Current member ids, as seen after every previously sent command
    pub async fn members(&self) -> Result<Vec<ConnectionId>, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomCommand::Members(tx)).await?;
        rx.await
            .map_err(|_| AppError::RoomUnavailable(self.name.to_string()))
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| AppError::RoomUnavailable(self.name.to_string()))
    }
}

/// The actor owning one room's member set
struct RoomActor {
    name: RoomName,
    members: HashMap<ConnectionId, Connection>,
    receiver: mpsc::Receiver<RoomCommand>,
    echo: EchoPolicy,
}

impl RoomActor {
    fn new(name: RoomName, receiver: mpsc::Receiver<RoomCommand>, echo: EchoPolicy) -> Self {
        Self {
            name,
            members: HashMap::new(),
            receiver,
            echo,
        }
    }

    async fn run(mut self) {
        debug!("Room {} started", self.name);

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!("Room {} stopped", self.name);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join(member) => self.handle_join(member),
            RoomCommand::Leave(id) => self.handle_leave(id),
            RoomCommand::Broadcast { from, payload } => self.handle_broadcast(from, payload),
            RoomCommand::Members(reply) => {
                let _ = reply.send(self.members.keys().copied().collect());
            }
        }
    }

    fn handle_join(&mut self, member: Connection) {
        let id = member.id();
        if self.members.contains_key(&id) {
            debug!("Connection {} already in room {}", id, self.name);
            return;
        }
        self.members.insert(id, member);
        info!(
            "Connection {} joined room {} ({} members)",
            id,
            self.name,
            self.members.len()
        );
    }

    fn handle_leave(&mut self, id: ConnectionId) {
        if self.members.remove(&id).is_some() {
            info!(
                "Connection {} left room {} ({} members)",
                id,
                self.name,
                self.members.len()
            );
        }
    }

    fn handle_broadcast(&mut self, from: Option<ConnectionId>, payload: Outbound) {
        let name = &self.name;
        let echo = self.echo;

        self.members.retain(|id, member| {
            if echo == EchoPolicy::SkipSender && Some(*id) == from {
                return true;
            }
            match member.try_send(payload.clone()) {
                Ok(()) => true,
                Err(SendError::Full) => {
                    warn!("Evicting unresponsive connection {} from room {}", id, name);
                    member.close();
                    false
                }
                Err(SendError::Closed) => {
                    debug!("Dropping closed connection {} from room {}", id, name);
                    false
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connection::{ConnectionState, Mailbox};

    fn room(echo: EchoPolicy) -> Room {
        Room::spawn(
            RoomName::from("test"),
            RoomConfig {
                inbox_capacity: 16,
                echo,
            },
        )
    }

    fn member(capacity: usize) -> (Connection, Mailbox) {
        Connection::new(capacity)
    }

    fn msg(s: &str) -> Outbound {
        Arc::from(s)
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let room = room(EchoPolicy::SkipSender);
        let (a, _rx) = member(4);

        room.join(a.clone()).await.unwrap();
        room.join(a.clone()).await.unwrap();

        assert_eq!(room.members().await.unwrap(), vec![a.id()]);
    }

    #[tokio::test]
    async fn test_leave_absent_is_noop() {
        let room = room(EchoPolicy::SkipSender);
        let (a, _rx) = member(4);
        room.join(a.clone()).await.unwrap();

        room.leave(ConnectionId::new()).await.unwrap();
        assert_eq!(room.members().await.unwrap(), vec![a.id()]);

        room.leave(a.id()).await.unwrap();
        room.leave(a.id()).await.unwrap();
        assert!(room.members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_fans_out_without_echo() {
        let room = room(EchoPolicy::SkipSender);
        let (a, mut a_rx) = member(4);
        let (b, mut b_rx) = member(4);
        let (c, mut c_rx) = member(4);
        for m in [&a, &b, &c] {
            room.join(m.clone()).await.unwrap();
        }

        room.broadcast(Some(a.id()), msg("first")).await.unwrap();
        room.broadcast(Some(a.id()), msg("second")).await.unwrap();
        room.members().await.unwrap();

        for rx in [&mut b_rx, &mut c_rx] {
            assert_eq!(rx.try_recv().as_deref(), Some("first"));
            assert_eq!(rx.try_recv().as_deref(), Some("second"));
            assert_eq!(rx.try_recv(), None);
        }
        assert_eq!(a_rx.try_recv(), None);
    }

    #[tokio::test]
    async fn test_broadcast_with_echo() {
        let room = room(EchoPolicy::IncludeSender);
        let (a, mut a_rx) = member(4);
        room.join(a.clone()).await.unwrap();

        room.broadcast(Some(a.id()), msg("hello")).await.unwrap();
        room.members().await.unwrap();

        assert_eq!(a_rx.try_recv().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_full_mailbox_is_evicted() {
        let room = room(EchoPolicy::SkipSender);
        let (fast, mut fast_rx) = member(8);
        let (slow, mut slow_rx) = member(1);
        room.join(fast.clone()).await.unwrap();
        room.join(slow.clone()).await.unwrap();

        // First fills the slow mailbox, second overflows it
        room.broadcast(None, msg("1")).await.unwrap();
        room.broadcast(None, msg("2")).await.unwrap();

        assert_eq!(room.members().await.unwrap(), vec![fast.id()]);
        assert_eq!(slow.state(), ConnectionState::Closing);

        room.broadcast(None, msg("3")).await.unwrap();
        room.members().await.unwrap();

        assert_eq!(fast_rx.try_recv().as_deref(), Some("1"));
        assert_eq!(fast_rx.try_recv().as_deref(), Some("2"));
        assert_eq!(fast_rx.try_recv().as_deref(), Some("3"));

        // The slow member only ever got what fit before eviction
        assert_eq!(slow_rx.recv().await.as_deref(), Some("1"));
        assert_eq!(slow_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_member_is_dropped_on_broadcast() {
        let room = room(EchoPolicy::SkipSender);
        let (a, _a_rx) = member(4);
        let (b, _b_rx) = member(4);
        room.join(a.clone()).await.unwrap();
        room.join(b.clone()).await.unwrap();

        b.close();
        room.broadcast(None, msg("x")).await.unwrap();

        assert_eq!(room.members().await.unwrap(), vec![a.id()]);
    }

    #[tokio::test]
    async fn test_same_room() {
        let r1 = room(EchoPolicy::SkipSender);
        let r2 = room(EchoPolicy::SkipSender);
        assert!(r1.same_room(&r1.clone()));
        assert!(!r1.same_room(&r2));
    }
}
