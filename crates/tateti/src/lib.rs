//! # Tateti
//!
//! Two-player tic-tac-toe over a shared document store, served to remote
//! clients over WebSocket.
//!
//! Each connection gets its own [`MatchSession`](tateti_match::MatchSession):
//! requests are validated against the latest match snapshot before
//! anything is written, and both players learn about each other's moves
//! from the match document's change feed, pushed to them as
//! `MatchUpdate` frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tateti::prelude::*;
//!
//! # async fn serve() -> Result<(), TatetiError> {
//! let server = TatetiServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(MemoryStore::new(), DevAuthenticator)
//!     .await?;
//! server.run().await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod handler;
mod server;
mod transport;

pub use auth::DevAuthenticator;
pub use error::TatetiError;
pub use server::{DEFAULT_IDLE_TIMEOUT, PROTOCOL_VERSION, TatetiServer, TatetiServerBuilder};
pub use transport::{
    ConnectionId, ConnectionReader, ConnectionWriter, TransportError, WebSocketConnection,
    WebSocketTransport,
};

/// Everything needed to run a server and talk to it.
pub mod prelude {
    pub use crate::{DevAuthenticator, PROTOCOL_VERSION, TatetiError, TatetiServer, TatetiServerBuilder};
    pub use tateti_match::{Concurrency, EngineConfig, MatchError};
    pub use tateti_protocol::{
        ClientMessage, Codec, Envelope, EventKind, JsonCodec, Match, MatchEvent, MatchId,
        MatchState, Move, PlayerId, Position, RejectReason, ServerMessage, Standing, Verdict,
    };
    pub use tateti_session::{Authenticator, SessionConfig, SessionError};
    pub use tateti_store::{DocumentStore, MemoryStore};
}
