//! Error types for the protocol layer.
//!
//! Every variant here ends up as the same thing on the wire: an
//! `invalidRequest` error reply. The variants exist so logs can say
//! *why* a message was refused.

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or a
    /// field of the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The bytes parsed, but the envelope is not one we understand:
    /// not an object, no `context` tag, or an unknown tag.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
