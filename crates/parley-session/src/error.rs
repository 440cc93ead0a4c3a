//! Error types for the session layer.

use parley_protocol::{ErrorCode, SessionId};

/// Reasons a session request is refused.
///
/// None of these change any state: the request is answered with an
/// `error` reply and everything stays as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No session is registered under this code.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session already has a peer, and the caller is not one of its
    /// occupants reconnecting.
    #[error("session {0} is full")]
    Full(SessionId),

    /// The caller is bound to a different session and must leave it first.
    #[error("already in session {0}")]
    AlreadyBound(SessionId),

    /// The caller is not in any session.
    #[error("not in a session")]
    NoSession,

    /// The caller's session has nobody on the other side.
    #[error("session {0} has no peer")]
    NoPeer(SessionId),
}

impl SessionError {
    /// The wire code sent back to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::SessionNotFound,
            Self::Full(_) => ErrorCode::SessionFull,
            Self::AlreadyBound(_) => ErrorCode::SessionExists,
            Self::NoSession => ErrorCode::NoP2PSession,
            Self::NoPeer(_) => ErrorCode::NoPeer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_maps_each_variant_to_wire_code() {
        let sid = SessionId::from("100000");
        assert_eq!(SessionError::NotFound(sid.clone()).code(), ErrorCode::SessionNotFound);
        assert_eq!(SessionError::Full(sid.clone()).code(), ErrorCode::SessionFull);
        assert_eq!(SessionError::AlreadyBound(sid.clone()).code(), ErrorCode::SessionExists);
        assert_eq!(SessionError::NoSession.code(), ErrorCode::NoP2PSession);
        assert_eq!(SessionError::NoPeer(sid).code(), ErrorCode::NoPeer);
    }
}
