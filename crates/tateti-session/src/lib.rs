//! Player identity and session management for Tateti.
//!
//! 1. **Identity**: who is playing ([`IdentityProvider`]), consumed by
//!    the match engine before every operation
//! 2. **Authentication**: turning a handshake token into a player id
//!    ([`Authenticator`])
//! 3. **Sessions**: who is connected, their resume tokens, and which
//!    match each one is watching ([`SessionManager`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Service (above)  ← authenticates connections, resumes sessions
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol (below)  ← PlayerId, MatchId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod identity;
mod manager;
mod session;

pub use auth::Authenticator;
pub use error::SessionError;
pub use identity::{FixedIdentity, IdentityProvider};
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
