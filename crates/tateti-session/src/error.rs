//! Error types for the session layer.

use tateti_protocol::PlayerId;

/// Errors that can occur while authenticating players or tracking
/// their sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The resume token doesn't match any session.
    #[error("invalid resume token")]
    InvalidToken,

    /// The player took longer than the grace period to come back.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),

    /// The player already has a connected session.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),
}
