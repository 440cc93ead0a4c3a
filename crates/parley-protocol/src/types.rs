//! Core protocol types for Parley's wire format.
//!
//! Every message, in both directions, is a JSON object carrying a string
//! `context` tag next to its fields:
//!
//! ```text
//! { "context": "joinSession", "sessionId": "482913" }
//! ```
//!
//! The tag picks the variant. Serde's *internally tagged* representation
//! (`#[serde(tag = "context")]`) gives exactly that shape, so the enums
//! below map one-to-one onto the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{Codec, ProtocolError};

/// The `context` tag of a relay message.
pub const RELAY_CONTEXT: &str = "p2p";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies a client across reconnects.
///
/// A newtype wrapper so a client id can never be confused with a session
/// code, even though both are strings underneath. `#[serde(transparent)]`
/// keeps it a plain string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The short numeric code players share to meet in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// The game setup chosen by the initiator.
///
/// The server only ever looks at `play_as_white`, and only to flip it for
/// the peer. `armory` is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Whether the *receiving* client plays the white side.
    #[serde(rename = "playAsWhite", default)]
    pub play_as_white: bool,

    /// Arbitrary inventory/config data, meaningful only to the clients.
    #[serde(default = "empty_object")]
    pub armory: Value,
}

impl GameConfig {
    /// Returns the copy the other side of the board should see.
    pub fn mirrored(&self) -> Self {
        Self {
            play_as_white: !self.play_as_white,
            armory: self.armory.clone(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            play_as_white: false,
            armory: empty_object(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable reason carried in an `error` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed JSON, missing `context`, or an unknown tag.
    #[serde(rename = "invalidRequest")]
    InvalidRequest,
    /// No session with that code exists.
    #[serde(rename = "sessionNotFound")]
    SessionNotFound,
    /// Both slots of the session are taken.
    #[serde(rename = "sessionFull")]
    SessionFull,
    /// The client is already in another session and must leave first.
    #[serde(rename = "sessionExists")]
    SessionExists,
    /// Relay attempted without being in a session.
    #[serde(rename = "noP2PSession")]
    NoP2PSession,
    /// Relay attempted while the session has nobody on the other end.
    #[serde(rename = "noPeer")]
    NoPeer,
}

impl ErrorCode {
    /// Short human-readable title shown by clients.
    pub fn title(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid request",
            Self::SessionNotFound => "Session not found",
            Self::SessionFull => "Session is full",
            Self::SessionExists => "Already in a session",
            Self::NoP2PSession => "No active session",
            Self::NoPeer => "No peer connected",
        }
    }
}

// ---------------------------------------------------------------------------
// ClientMessage: client → server
// ---------------------------------------------------------------------------

/// Structured requests a client can send.
///
/// Relay (`p2p`) messages are deliberately absent: their bodies are
/// forwarded byte-for-byte and never parsed. See [`Inbound`].
///
/// The field-less variants use `{}` rather than unit syntax so extra
/// fields sent by a client are ignored instead of rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "context")]
pub enum ClientMessage {
    /// "Open a session and make me its initiator."
    ///
    /// A missing `config` means the default setup.
    #[serde(rename = "newSession")]
    NewSession {
        #[serde(default)]
        config: GameConfig,
    },

    /// "Tear down my session."
    #[serde(rename = "destroySession")]
    DestroySession {},

    /// "Put me in the session with this code."
    #[serde(rename = "joinSession")]
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// "Take me out of my session."
    #[serde(rename = "leaveSession")]
    LeaveSession {},
}

impl ClientMessage {
    /// Every `context` tag this enum accepts.
    pub const CONTEXTS: [&'static str; 4] =
        ["newSession", "destroySession", "joinSession", "leaveSession"];
}

// ---------------------------------------------------------------------------
// ServerMessage: server → client
// ---------------------------------------------------------------------------

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "context")]
pub enum ServerMessage {
    /// First message on every connection: the id to present on reconnect.
    #[serde(rename = "handshake")]
    Handshake {
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },

    /// Reply to `newSession`.
    #[serde(rename = "sessionCreated")]
    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Sent to both occupants once a session has two sides.
    /// `config.play_as_white` is from the receiver's point of view.
    #[serde(rename = "sessionJoined")]
    SessionJoined {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        config: GameConfig,
    },

    /// The other occupant left or lost its connection.
    #[serde(rename = "peerDisconnected")]
    PeerDisconnected {},

    /// The session no longer exists.
    #[serde(rename = "sessionDestroyed")]
    SessionDestroyed {},

    /// A request was refused.
    #[serde(rename = "error")]
    Error {
        error: ErrorCode,
        title: String,
        #[serde(rename = "errMsg", default, skip_serializing_if = "Option::is_none")]
        err_msg: Option<String>,
    },
}

impl ServerMessage {
    /// Builds an `error` reply with the code's standard title.
    pub fn error(code: ErrorCode, detail: Option<String>) -> Self {
        Self::Error {
            error: code,
            title: code.title().to_owned(),
            err_msg: detail,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound: classified client input
// ---------------------------------------------------------------------------

/// A client message after the envelope has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A structured request for the session state machine.
    Control(ClientMessage),
    /// A relay message: the exact bytes the client sent, to be forwarded
    /// verbatim.
    Relay(Vec<u8>),
}

impl Inbound {
    /// Classifies raw client input.
    ///
    /// Only the outer envelope of a relay message is validated (a JSON
    /// object whose `context` is `"p2p"`); its body is kept as-is.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`]: not JSON, or a known tag with a body
    ///   that doesn't fit
    /// - [`ProtocolError::InvalidMessage`]: no `context`, or an unknown one
    pub fn decode(codec: &impl Codec, data: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = codec.decode(data)?;

        let context = value
            .get("context")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage("missing context tag".into())
            })?;

        if context == RELAY_CONTEXT {
            return Ok(Self::Relay(data.to_vec()));
        }
        if !ClientMessage::CONTEXTS.contains(&context) {
            return Err(ProtocolError::InvalidMessage(format!(
                "unknown context {context:?}"
            )));
        }

        serde_json::from_value(value)
            .map(Self::Control)
            .map_err(ProtocolError::Decode)
    }
}

// =========================================================================
// Tests
// =========================================================================
