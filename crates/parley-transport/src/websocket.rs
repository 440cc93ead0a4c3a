//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{
    Connection, ConnectionId, Frame, HandshakeInfo, PendingConnection,
    Transport, TransportError,
};

/// Header a returning client uses to present its previous client id.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Header set by reverse proxies with the original client address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// How long a client gets to finish the WebSocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    shut_down: AtomicBool,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns the address the listener is actually bound to.
    ///
    /// Useful after binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }

        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%addr, "accepted TCP stream");

        Ok(PendingWebSocket { stream, addr })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        tracing::info!("WebSocket transport shutting down");
        self.shut_down.store(true, Ordering::Release);
        Ok(())
    }
}

/// A TCP stream waiting for its WebSocket upgrade.
///
/// Upgrade it from the task that will own the connection, not from the
/// accept loop.
#[derive(Debug)]
pub struct PendingWebSocket {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PendingConnection for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn upgrade(self) -> Result<Self::Connection, Self::Error> {
        let Self { stream, addr } = self;

        let mut handshake = HandshakeInfo::default();
        let upgrade = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                handshake.client_id = header_value(req, CLIENT_ID_HEADER);
                handshake.remote_addr = header_value(req, FORWARDED_FOR_HEADER)
                    .and_then(|hops| first_hop(&hops));
                Ok(resp)
            },
        );

        let ws = tokio::time::timeout(HANDSHAKE_TIMEOUT, upgrade)
            .await
            .map_err(|_| {
                TransportError::HandshakeFailed(format!(
                    "{addr} did not finish the upgrade in time"
                ))
            })?
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        if handshake.remote_addr.is_none() {
            handshake.remote_addr = Some(addr.to_string());
        }

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(
            %id,
            %addr,
            client_id = ?handshake.client_id,
            "accepted WebSocket connection"
        );

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            handshake,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The read and write halves sit behind separate locks so a task parked
/// in [`recv`](Connection::recv) never holds up a send.
pub struct WebSocketConnection {
    id: ConnectionId,
    handshake: HandshakeInfo,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.write(msg).await
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.write(Message::Ping(Default::default())).await
    }

    async fn recv(&self) -> Result<Option<Frame>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Binary(data.to_vec())));
                }
                Some(Ok(Message::Pong(_))) => return Ok(Some(Frame::Pong)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // tungstenite answers pings on its own
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self, reason: &str) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_owned().into(),
        };
        self.write(Message::Close(Some(frame))).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn handshake(&self) -> &HandshakeInfo {
        &self.handshake
    }
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// `X-Forwarded-For` lists every hop; the client is the first one.
fn first_hop(hops: &str) -> Option<String> {
    hops.split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_hop_takes_leftmost_address() {
        assert_eq!(
            first_hop("203.0.113.7, 10.0.0.1, 10.0.0.2").as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_first_hop_skips_empty_entries() {
        assert_eq!(first_hop(" , 198.51.100.4").as_deref(), Some("198.51.100.4"));
        assert!(first_hop(" , ").is_none());
    }
}
