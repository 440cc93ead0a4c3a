//! Unified error type for the Parley server.

use parley_transport::TransportError;

/// Top-level error for the server crate.
///
/// Refused session requests never show up here: the coordinator answers
/// them on the wire with an `error` message and carries on.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (bind, accept, upgrade, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The coordinator task has stopped, so no event can be delivered.
    #[error("coordinator is not running")]
    CoordinatorUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::HandshakeFailed("bad upgrade".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Transport(_)));
        assert!(parley_err.to_string().contains("bad upgrade"));
    }

    #[test]
    fn test_coordinator_unavailable_message() {
        assert_eq!(
            ParleyError::CoordinatorUnavailable.to_string(),
            "coordinator is not running"
        );
    }
}
