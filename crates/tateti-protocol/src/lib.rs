//! Wire vocabulary for Tateti.
//!
//! - **Types** ([`Match`], [`Move`], [`Position`], [`PlayerId`],
//!   [`MatchId`], [`MatchEvent`]): the persisted match document. Its
//!   JSON shape is the contract between the two players' clients.
//! - **Standing** ([`MatchState`], [`Verdict`], [`Standing`]): what a
//!   snapshot means for the player reading it.
//! - **Messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`]):
//!   what remote clients and the session service say to each other.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, bytes out.
//!
//! ```text
//! Store (documents) ← Protocol (Match, Envelope) → Service (frames)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, RejectReason, ServerMessage};
pub use types::{
    EventKind, InvalidPosition, Match, MatchEvent, MatchId, MatchState, Move, PlayerId,
    Position, Standing, Verdict,
};
