//! Per-connection handler: registration, frame pumping, and close.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Complete the WebSocket upgrade, off the accept loop
//!   1. Register with the coordinator → client id assigned, handshake queued
//!   2. Loop: forward inbound frames to the coordinator, and write whatever
//!      the coordinator queues for this connection
//!   3. On close (either side), report it so the session state is cleaned up

use parley_protocol::ClientId;
use parley_session::Outbound;
use parley_transport::{Connection, ConnectionId, Frame, PendingConnection, PendingWebSocket};
use tokio::sync::mpsc;

use crate::actor::CoordinatorHandle;
use crate::ParleyError;

/// Drop guard that reports the close to the coordinator when the handler
/// exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async send.
struct CloseGuard {
    client_id: ClientId,
    conn_id: ConnectionId,
    coordinator: CoordinatorHandle,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let client_id = self.client_id.clone();
        let conn_id = self.conn_id;
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let _ = coordinator.closed(client_id, conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    pending: PendingWebSocket,
    coordinator: CoordinatorHandle,
) -> Result<(), ParleyError> {
    let peer_addr = pending.peer_addr();
    let conn = pending.upgrade().await.inspect_err(|e| {
        tracing::debug!(%peer_addr, error = %e, "websocket upgrade failed");
    })?;
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    // --- Step 1: Register ---
    let client_id = coordinator
        .connect(conn_id, conn.handshake().clone(), out_tx)
        .await?;
    let _guard = CloseGuard {
        client_id: client_id.clone(),
        conn_id,
        coordinator: coordinator.clone(),
    };

    // --- Step 2: Pump ---
    loop {
        tokio::select! {
            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(Frame::Text(text))) => text.into_bytes(),
                    Ok(Some(Frame::Binary(bytes))) => bytes,
                    Ok(Some(Frame::Pong)) => {
                        coordinator.pong(client_id.clone(), conn_id).await?;
                        continue;
                    }
                    Ok(None) => {
                        tracing::debug!(%client_id, %conn_id, "connection closed by client");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%client_id, %conn_id, error = %e, "recv error");
                        break;
                    }
                };
                coordinator.message(client_id.clone(), conn_id, data).await?;
            }
            outbound = out_rx.recv() => {
                let result = match outbound {
                    Some(Outbound::Data(bytes)) => conn.send(&bytes).await,
                    Some(Outbound::Ping) => conn.ping().await,
                    Some(Outbound::Close(reason)) => {
                        let _ = conn.close(&reason).await;
                        break;
                    }
                    // The coordinator dropped this connection's handle.
                    None => break,
                };
                if let Err(e) = result {
                    tracing::debug!(%client_id, %conn_id, error = %e, "send error");
                    break;
                }
            }
        }
    }

    // _guard drops here → close reported.
    Ok(())
}
