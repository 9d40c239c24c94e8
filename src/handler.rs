//! WebSocket connection handler
//!
//! Drives one upgraded socket: a write task drains the connection's
//! mailbox onto the wire, while the read loop decodes inbound frames and
//! hands them to the participant. Either side failing ends the connection,
//! and the participant then leaves every room it joined.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, Mailbox};
use crate::error::AppError;
use crate::participant::Participant;
use crate::registry::Registry;

/// Handle a freshly upgraded WebSocket
///
/// Returns once both the read and write loops have exited.
pub async fn handle_socket(socket: WebSocket, registry: Registry, mailbox_capacity: usize) {
    let (connection, mailbox) = Connection::new(mailbox_capacity);
    let connection_id = connection.id();
    info!("Connection {} opened", connection_id);

    let (ws_sender, ws_receiver) = socket.split();

    // Spawn write task (mailbox -> WebSocket)
    let write_task = tokio::spawn(write_loop(ws_sender, mailbox, connection.clone()));

    // Read loop runs here so the participant stays on this task
    let mut participant = Participant::new(connection.clone());
    if let Err(e) = read_loop(ws_receiver, &mut participant, &registry).await {
        error!("WebSocket error for {}: {}", connection_id, e);
    }

    participant.on_disconnect().await;
    connection.close();

    if write_task.await.is_err() {
        error!("Write task for {} panicked", connection_id);
    }
    connection.mark_closed();

    info!("Connection {} closed", connection_id);
}

/// Read frames until close, transport error, or eviction
async fn read_loop(
    mut ws_receiver: SplitStream<WebSocket>,
    participant: &mut Participant,
    registry: &Registry,
) -> Result<(), AppError> {
    let connection = participant.connection().clone();
    let id = connection.id();

    loop {
        let frame = tokio::select! {
            frame = ws_receiver.next() => frame,
            _ = connection.closed() => {
                debug!("Connection {} closed while reading", id);
                return Ok(());
            }
        };

        let Some(frame) = frame else {
            debug!("Connection {} stream ended", id);
            return Ok(());
        };

        match frame? {
            Message::Text(text) => {
                participant.handle_text(text.as_str(), registry).await;
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => participant.handle_text(text, registry).await,
                Err(_) => warn!("Invalid envelope from {}: {}", id, AppError::InvalidUtf8),
            },
            Message::Close(_) => {
                debug!("Connection {} sent close frame", id);
                return Ok(());
            }
            Message::Ping(_) => {
                // Pong is handled automatically by the transport
                debug!("Ping from {}", id);
            }
            Message::Pong(_) => {
                debug!("Pong from {}", id);
            }
        }
    }
}

/// Drain the mailbox onto the socket, then send a close frame
async fn write_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut mailbox: Mailbox,
    connection: Connection,
) {
    let id = mailbox.id();

    while let Some(payload) = mailbox.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(payload.to_string().into())).await {
            debug!("WebSocket send failed for {}: {}", id, e);
            // Stops the read loop too
            connection.close();
            break;
        }
    }
    debug!("Write task ended for {}", id);

    let _ = ws_sender.send(Message::Close(None)).await;
    let _ = ws_sender.close().await;
}
