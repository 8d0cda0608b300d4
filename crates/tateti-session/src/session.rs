//! Session types: the server's record of one player's connection.

use std::time::Instant;

use tateti_protocol::{MatchId, PlayerId};

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a disconnected player has to come back
    /// with their resume token before the session expires.
    ///
    /// Default: 30 seconds. 0 disables resuming.
    pub reconnect_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
        }
    }
}

/// Where a session is in its lifecycle.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(timeout)──→ Expired
///       ↑                            │
///       └────────(reconnect)─────────┘
/// ```
#[derive(Debug, Clone)]
pub enum SessionState {
    Connected,

    /// Lost the connection at `since`; may come back until
    /// `since + grace`.
    Disconnected { since: Instant },

    /// Gone for good. Removed on the next cleanup.
    Expired,
}

/// One player's session.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,

    pub state: SessionState,

    /// Secret the client presents to resume this session after a drop.
    /// 32 hex characters (128 random bits).
    pub reconnect_token: String,

    /// The match this player was observing, so a resumed session can
    /// pick it up again.
    pub current_match: Option<MatchId>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected)
    }
}
