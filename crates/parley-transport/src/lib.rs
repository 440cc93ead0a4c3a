//! Transport abstraction layer for Parley.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the duplex channel a client talks to us on. The rest of the server only
//! needs four primitives from a connection: send, receive, ping, close.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    CLIENT_ID_HEADER, FORWARDED_FOR_HEADER, PendingWebSocket,
    WebSocketConnection, WebSocketTransport,
};

use std::fmt;

/// Opaque identifier for a single physical connection.
///
/// Two connections presenting the same client id (a reconnect) still get
/// different `ConnectionId`s, which is how stale close notifications are
/// told apart from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the client told us while opening the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Reconnect identifier supplied by the client, if any.
    pub client_id: Option<String>,
    /// Originating address: the first forwarded hop when a proxy set one,
    /// otherwise the TCP peer address.
    pub remote_addr: Option<String>,
}

/// A single frame read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// The answer to a liveness probe sent with [`Connection::ping`].
    Pong,
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// What [`accept`](Self::accept) hands out: a connection that still
    /// has to finish its protocol handshake.
    type Pending: PendingConnection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming stream.
    ///
    /// Returns as soon as the stream is accepted. The handshake is left to
    /// [`PendingConnection::upgrade`] so one slow client never holds up the
    /// accept loop.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;

    /// Stops accepting. Every later [`accept`](Self::accept) fails.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// An accepted stream whose handshake has not run yet.
pub trait PendingConnection: Send + 'static {
    /// The connection produced by a successful upgrade.
    type Connection: Connection;
    /// The error type for the upgrade.
    type Error: std::error::Error + Send + Sync;

    /// The TCP peer address.
    fn peer_addr(&self) -> std::net::SocketAddr;

    /// Runs the handshake, bounded by a timeout.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that can send and receive messages.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    ///
    /// Valid UTF-8 goes out as a text message, anything else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Sends a liveness probe. The answer arrives through
    /// [`recv`](Self::recv) as [`Frame::Pong`].
    async fn ping(&self) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Frame>, Self::Error>;

    /// Closes the connection, telling the peer why.
    async fn close(&self, reason: &str) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the metadata captured during the opening handshake.
    fn handshake(&self) -> &HandshakeInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_equality() {
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(1);
        let c = ConnectionId::new(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_handshake_info_default_is_empty() {
        let info = HandshakeInfo::default();
        assert!(info.client_id.is_none());
        assert!(info.remote_addr.is_none());
    }
}
