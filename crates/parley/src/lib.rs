//! # Parley
//!
//! Signaling and relay server that pairs two game clients into a session.
//!
//! One client opens a session and gets a six-digit code; a second client
//! joins with that code. From then on the server forwards `p2p` messages
//! between them verbatim, tells each side when the other leaves, and
//! cleans up sessions whose clients have gone away.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let server = ParleyServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod actor;
mod coordinator;
mod error;
mod handler;
mod server;

pub use actor::{CoordinatorHandle, EVENT_CHANNEL_SIZE, spawn_coordinator};
pub use coordinator::{Coordinator, CoordinatorStats};
pub use error::ParleyError;
pub use server::{DEFAULT_SWEEP_INTERVAL, ParleyServer, ParleyServerBuilder, ServerConfig};

/// Everything needed to run a server or talk its protocol.
pub mod prelude {
    pub use crate::{
        CoordinatorHandle, CoordinatorStats, ParleyError, ParleyServer,
        ParleyServerBuilder, ServerConfig,
    };
    pub use parley_protocol::{
        ClientId, ClientMessage, Codec, ErrorCode, GameConfig, JsonCodec,
        RELAY_CONTEXT, ServerMessage, SessionId,
    };
}
