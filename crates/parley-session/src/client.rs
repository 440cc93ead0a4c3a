//! Connection handles: the server's view of one connected client.
//!
//! A handle does not own the socket. It owns an outbound channel to the
//! task that does, plus the bookkeeping the coordinator needs: the
//! liveness flag, the originating address, and which session (if any) the
//! client is bound to.

use std::fmt;

use parley_protocol::{ClientId, Codec, ServerMessage, SessionId};
use parley_transport::ConnectionId;
use tokio::sync::mpsc;

/// Work for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes to send as-is.
    Data(Vec<u8>),
    /// Send a liveness probe.
    Ping,
    /// Close the transport with this reason.
    Close(String),
}

/// Channel into a connection's writer task.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Identifies one physical connection of one client.
///
/// Session slots hold keys, not handles. A slot whose key no longer
/// matches the registered handle (the client reconnected, or is gone)
/// simply resolves to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub client_id: ClientId,
    pub conn_id: ConnectionId,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_id, self.conn_id)
    }
}

/// A connected client.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    conn_id: ConnectionId,
    remote_addr: Option<String>,
    /// Cleared by each sweep, set again by the pong.
    alive: bool,
    session: Option<SessionId>,
    outbound: OutboundSender,
}

impl ClientHandle {
    /// Creates a live, unbound handle.
    pub fn new(
        id: ClientId,
        conn_id: ConnectionId,
        remote_addr: Option<String>,
        outbound: OutboundSender,
    ) -> Self {
        Self {
            id,
            conn_id,
            remote_addr,
            alive: true,
            session: None,
            outbound,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            client_id: self.id.clone(),
            conn_id: self.conn_id,
        }
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// The session this client is bound to, if any.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn bind(&mut self, session_id: SessionId) {
        self.session = Some(session_id);
    }

    /// Clears the session binding, returning what it was.
    pub fn unbind(&mut self) -> Option<SessionId> {
        self.session.take()
    }

    /// Encodes and queues a structured message.
    ///
    /// Never fails from the caller's point of view: if the writer is gone
    /// the connection is already closing and the close path will clean up.
    pub fn send(&self, codec: &impl Codec, msg: &ServerMessage) {
        match codec.encode(msg) {
            Ok(bytes) => self.send_raw(bytes),
            Err(e) => {
                tracing::error!(client_id = %self.id, error = %e, "failed to encode message");
            }
        }
    }

    /// Queues bytes exactly as given.
    pub fn send_raw(&self, data: Vec<u8>) {
        let _ = self.outbound.send(Outbound::Data(data));
    }

    /// Clears the liveness flag and sends a ping. A pong before the next
    /// sweep sets the flag again.
    pub fn probe_liveness(&mut self) {
        self.alive = false;
        let _ = self.outbound.send(Outbound::Ping);
    }

    pub fn mark_alive(&mut self) {
        self.alive = true;
    }

    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Asks the writer to close the transport.
    pub fn terminate(&mut self, reason: &str) {
        tracing::info!(
            client_id = %self.id,
            conn_id = %self.conn_id,
            addr = self.remote_addr.as_deref().unwrap_or("unknown"),
            reason,
            "terminating connection"
        );
        self.alive = false;
        let _ = self.outbound.send(Outbound::Close(reason.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::JsonCodec;

    fn handle() -> (ClientHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::new(
            ClientId::from("c-1"),
            ConnectionId::new(1),
            Some("127.0.0.1:5000".into()),
            tx,
        );
        (handle, rx)
    }

    #[test]
    fn test_new_handle_is_alive_and_unbound() {
        let (handle, _rx) = handle();
        assert!(handle.is_alive());
        assert!(handle.session().is_none());
        assert_eq!(handle.remote_addr(), Some("127.0.0.1:5000"));
    }

    #[test]
    fn test_send_queues_encoded_json() {
        let (handle, mut rx) = handle();

        handle.send(&JsonCodec, &ServerMessage::PeerDisconnected {});

        let Outbound::Data(bytes) = rx.try_recv().unwrap() else {
            panic!("expected data");
        };
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["context"], "peerDisconnected");
    }

    #[test]
    fn test_send_after_writer_dropped_is_absorbed() {
        let (handle, rx) = handle();
        drop(rx);

        // Must not panic or error.
        handle.send(&JsonCodec, &ServerMessage::SessionDestroyed {});
        handle.send_raw(b"raw".to_vec());
    }

    #[test]
    fn test_ping_check_clears_flag_and_pings() {
        let (mut handle, mut rx) = handle();

        handle.probe_liveness();

        assert!(!handle.is_alive());
        assert_eq!(rx.try_recv().unwrap(), Outbound::Ping);

        handle.mark_alive();
        assert!(handle.is_alive());
    }

    #[test]
    fn test_terminate_requests_close() {
        let (mut handle, mut rx) = handle();

        handle.terminate("missed pong");

        assert!(!handle.is_alive());
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close("missed pong".into()));
    }

    #[test]
    fn test_bind_and_unbind() {
        let (mut handle, _rx) = handle();

        handle.bind(SessionId::from("123456"));
        assert_eq!(handle.session(), Some(&SessionId::from("123456")));

        assert_eq!(handle.unbind(), Some(SessionId::from("123456")));
        assert!(handle.session().is_none());
    }
}
