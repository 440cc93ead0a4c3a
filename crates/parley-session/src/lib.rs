//! Client and session bookkeeping for Parley.
//!
//! This crate holds the data the coordinator mutates:
//!
//! 1. **Connection handles**: one per connected client ([`ClientHandle`])
//! 2. **Sessions**: an initiator plus an optional peer ([`Session`])
//! 3. **Registries**: where both live ([`ClientRegistry`],
//!    [`SessionRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← runs the state machine over these types
//!     ↕
//! Session Layer (this crate)  ← who is connected, who is paired with whom
//!     ↕
//! Protocol Layer (below)  ← provides ClientId, SessionId, ServerMessage
//! ```
//!
//! Handles and sessions reference each other by id only: a handle knows
//! its `SessionId`, a session knows the [`ConnectionKey`] in each slot.

mod client;
mod clients;
mod error;
mod session;
mod sessions;

pub use client::{ClientHandle, ConnectionKey, Outbound, OutboundSender};
pub use clients::ClientRegistry;
pub use error::SessionError;
pub use session::{Role, Session};
pub use sessions::{MAX_SESSION_CODE, MIN_SESSION_CODE, SessionRegistry};
