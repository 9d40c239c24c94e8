//! Connection handle and outbound mailbox
//!
//! A `Connection` is the cheap, cloneable sending side of one peer's
//! bounded outbound queue. Rooms hold clones of it as their members. The
//! matching `Mailbox` is drained by the connection's write loop.
//!
//! Closing a connection is idempotent and visible to every clone: once
//! closed, further sends fail and the mailbox yields whatever was already
//! queued, then `None`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::types::ConnectionId;

/// Serialized message queued for the wire
pub type Outbound = Arc<str>;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepting messages
    Open,
    /// Close requested; the write loop is flushing and shutting down
    Closing,
    /// Both read and write loops have exited
    Closed,
}

#[derive(Debug)]
struct Shared {
    id: ConnectionId,
    state: AtomicU8,
    shutdown: CancellationToken,
}

/// Sending side of a connection
#[derive(Debug, Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Outbound>,
}

/// Receiving side of a connection's outbound queue
#[derive(Debug)]
pub struct Mailbox {
    shared: Arc<Shared>,
    receiver: mpsc::Receiver<Outbound>,
}

impl Connection {
    /// Create a connection with a mailbox holding at most `capacity` messages
    pub fn new(capacity: usize) -> (Connection, Mailbox) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(Shared {
            id: ConnectionId::new(),
            state: AtomicU8::new(OPEN),
            shutdown: CancellationToken::new(),
        });
        let connection = Connection {
            shared: shared.clone(),
            sender,
        };
        (connection, Mailbox { shared, receiver })
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        match self.shared.state.load(Ordering::Acquire) {
            OPEN => ConnectionState::Open,
            CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Enqueue a message without waiting
    ///
    /// Fails with `SendError::Full` when the consumer has fallen
    /// `capacity` messages behind.
    pub fn try_send(&self, msg: Outbound) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Request shutdown of this connection
    ///
    /// Returns `true` for the call that actually moved the connection out
    /// of the open state.
    pub fn close(&self) -> bool {
        let first = self
            .shared
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.shared.shutdown.cancel();
        first
    }

    /// Resolves once `close` has been called on any clone
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await
    }

    /// Record that both loops have exited
    pub(crate) fn mark_closed(&self) {
        self.shared.shutdown.cancel();
        self.shared.state.store(CLOSED, Ordering::Release);
    }
}

impl Mailbox {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Wait for the next outbound message
    ///
    /// After close, drains what is already queued and then returns `None`.
    pub async fn recv(&mut self) -> Option<Outbound> {
        if self.shared.shutdown.is_cancelled() {
            return self.receiver.try_recv().ok();
        }
        tokio::select! {
            msg = self.receiver.recv() => msg,
            _ = self.shared.shutdown.cancelled() => self.receiver.try_recv().ok(),
        }
    }

    /// Take a queued message without waiting
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(s: &str) -> Outbound {
        Arc::from(s)
    }

    #[tokio::test]
    async fn test_connection_creation() {
        let (conn, mailbox) = Connection::new(4);
        assert_eq!(conn.id(), mailbox.id());
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_send_and_receive_in_order() {
        let (conn, mut mailbox) = Connection::new(4);
        conn.try_send(msg("a")).unwrap();
        conn.try_send(msg("b")).unwrap();

        assert_eq!(mailbox.recv().await.as_deref(), Some("a"));
        assert_eq!(mailbox.recv().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_full_mailbox() {
        let (conn, _mailbox) = Connection::new(2);
        conn.try_send(msg("1")).unwrap();
        conn.try_send(msg("2")).unwrap();
        assert_eq!(conn.try_send(msg("3")), Err(SendError::Full));
    }

    #[tokio::test]
    async fn test_close_is_shared_and_idempotent() {
        let (conn, _mailbox) = Connection::new(2);
        let clone = conn.clone();

        assert!(clone.close());
        assert!(!conn.close());
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(conn.try_send(msg("x")), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (conn, mut mailbox) = Connection::new(4);
        conn.try_send(msg("queued")).unwrap();
        conn.close();

        assert_eq!(mailbox.recv().await.as_deref(), Some("queued"));
        assert_eq!(mailbox.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let (conn, mut mailbox) = Connection::new(4);
        let waiter = tokio::spawn(async move { mailbox.recv().await });

        tokio::task::yield_now().await;
        conn.close();

        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_closed() {
        let (conn, _mailbox) = Connection::new(1);
        conn.close();
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.closed().await;
    }
}
