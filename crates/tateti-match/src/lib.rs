//! The tateti match session engine.
//!
//! Two players, one shared document, no server-side referee: each
//! client validates moves locally against the latest snapshot, writes
//! the change to the store, and learns about the other player's moves
//! from the document's change feed.
//!
//! # Key types
//!
//! - [`engine`]: pure transitions ([`start`], [`join`], [`apply_move`])
//! - [`rules`]: the eight lines, turn order, win and draw detection
//! - [`state_of`] / [`verdict_for`] / [`standing_for`]: lifecycle and
//!   per-player outcome of a snapshot
//! - [`MatchRepository`] / [`MatchFeed`]: matches in a document store
//! - [`MatchSession`]: what one client drives
//! - [`MatchLobby`]: live listing of every match
//! - [`EngineConfig`]: collection name and concurrency mode

mod config;
pub mod engine;
mod error;
mod lobby;
mod repository;
pub mod rules;
mod session;
mod state;

pub use config::{Concurrency, EngineConfig};
pub use engine::{MoveOutcome, apply_move, join, start};
pub use error::MatchError;
pub use lobby::MatchLobby;
pub use repository::{MatchFeed, MatchRepository};
pub use session::MatchSession;
pub use state::{standing_for, state_of, verdict_for};
pub use tateti_protocol::{MatchState, Standing, Verdict};
