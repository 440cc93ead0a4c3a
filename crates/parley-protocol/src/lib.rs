//! Wire protocol for Parley.
//!
//! This crate defines the "language" clients and the server speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`ErrorCode`],
//!   [`GameConfig`]): the JSON messages that travel on the wire.
//! - **Classification** ([`Inbound`]): splitting client input into
//!   structured requests and opaque relay payloads.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! ```text
//! Transport (frames) → Protocol (Inbound) → Coordinator (sessions)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientId, ClientMessage, ErrorCode, GameConfig, Inbound, RELAY_CONTEXT,
    ServerMessage, SessionId,
};
