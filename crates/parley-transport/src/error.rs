/// Errors that can occur in the transport layer.
///
/// None of these are application errors: the server treats every one of
/// them as "this connection is gone" and lets the close path clean up.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or accepting a TCP stream failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade was rejected or did not finish in time.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
