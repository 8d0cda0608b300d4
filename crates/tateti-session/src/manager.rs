//! The session manager: every connected (or recently dropped) player.
//!
//! Not thread-safe by itself. The server keeps it behind a
//! `tokio::sync::Mutex` and holds the lock only for quick bookkeeping,
//! never across network I/O.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tateti_protocol::{MatchId, PlayerId};

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Tracks player sessions and their resume tokens.
///
/// ```text
/// authenticate() ──→ create() ──→ disconnect() ──→ reconnect()
///                       │               │                │
///                       ▼               ▼                ▼
///                    [Connected]   [Disconnected]   [Connected]
///                                      │
///                                      ▼ (after grace period)
///                                  [Expired] ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,

    /// Resume token → player. Kept in sync with `sessions`.
    tokens: HashMap<String, PlayerId>,

    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    /// Starts a fresh session for a player who just authenticated.
    ///
    /// A disconnected or expired session for the same player is
    /// replaced, and its token stops working.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the player is connected on
    /// another socket.
    pub fn create(&mut self, player_id: PlayerId) -> Result<&Session, SessionError> {
        if let Some(existing) = self.sessions.get(&player_id) {
            if existing.is_connected() {
                return Err(SessionError::AlreadyConnected(player_id));
            }
            self.tokens.remove(&existing.reconnect_token);
        }

        let token = generate_token();
        self.tokens.insert(token.clone(), player_id.clone());

        tracing::info!(%player_id, "session created");

        let session = Session {
            player_id: player_id.clone(),
            state: SessionState::Connected,
            reconnect_token: token,
            current_match: None,
        };
        Ok(self.sessions.entry(player_id).insert_entry(session).into_mut())
    }

    /// Marks a player as disconnected and starts the grace period.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the player has no session.
    pub fn disconnect(&mut self, player_id: &PlayerId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };

        tracing::info!(%player_id, "player disconnected, grace period started");
        Ok(())
    }

    /// Brings a disconnected session back using its resume token. The
    /// session keeps its token and its current match.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: token not recognized
    /// - [`SessionError::SessionExpired`]: grace period elapsed
    /// - [`SessionError::AlreadyConnected`]: the session never dropped
    pub fn reconnect(&mut self, token: &str) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(SessionError::InvalidToken)?;

        let grace = Duration::from_secs(self.config.reconnect_grace_secs);
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match session.state {
            SessionState::Disconnected { since } if since.elapsed() > grace => {
                session.state = SessionState::Expired;
                Err(SessionError::SessionExpired(player_id))
            }
            SessionState::Disconnected { .. } => {
                session.state = SessionState::Connected;
                tracing::info!(
                    %player_id,
                    current_match = ?session.current_match,
                    "player reconnected"
                );
                Ok(&*session)
            }
            SessionState::Connected => Err(SessionError::AlreadyConnected(player_id)),
            SessionState::Expired => Err(SessionError::SessionExpired(player_id)),
        }
    }

    /// Records which match the player is observing (`None` after
    /// leaving one).
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the player has no session.
    pub fn set_current_match(
        &mut self,
        player_id: &PlayerId,
        match_id: Option<MatchId>,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;
        session.current_match = match_id;
        Ok(())
    }

    /// Expires every disconnected session past its grace period and
    /// returns the affected players.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = Duration::from_secs(self.config.reconnect_grace_secs);
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    tracing::info!(
                        player_id = %session.player_id,
                        "session expired (grace period elapsed)"
                    );
                    expired.push(session.player_id.clone());
                }
            }
        }

        expired
    }

    /// Drops expired sessions and their tokens.
    pub fn cleanup_expired(&mut self) {
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                self.tokens.remove(&session.reconnect_token);
                false
            } else {
                true
            }
        });
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Time-dependent paths use a 0-second grace period (expires
    //! immediately) or a 1-hour one (never expires during the test).

    use super::*;

    fn manager_with_instant_expiry() -> SessionManager {
        SessionManager::new(SessionConfig {
            reconnect_grace_secs: 0,
        })
    }

    fn manager_with_long_grace() -> SessionManager {
        SessionManager::new(SessionConfig {
            reconnect_grace_secs: 3600,
        })
    }

    fn pid(name: &str) -> PlayerId {
        PlayerId::new(name)
    }

    fn token_of(mgr: &mut SessionManager, name: &str) -> String {
        mgr.create(pid(name)).unwrap().reconnect_token.clone()
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_new_player_returns_connected_session() {
        let mut mgr = manager_with_long_grace();

        let session = mgr.create(pid("ana")).expect("should succeed");

        assert!(session.is_connected());
        assert_eq!(session.player_id, pid("ana"));
        assert_eq!(session.reconnect_token.len(), 32);
        assert!(session.current_match.is_none());
    }

    #[test]
    fn test_create_multiple_players_each_gets_unique_token() {
        let mut mgr = manager_with_long_grace();

        let a = token_of(&mut mgr, "ana");
        let b = token_of(&mut mgr, "beto");

        assert_ne!(a, b);
    }

    #[test]
    fn test_create_already_connected_returns_error() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid("ana")).unwrap();

        let result = mgr.create(pid("ana"));

        assert!(matches!(result, Err(SessionError::AlreadyConnected(p)) if p == pid("ana")));
    }

    #[test]
    fn test_create_replaces_disconnected_session_and_old_token() {
        let mut mgr = manager_with_long_grace();
        let old = token_of(&mut mgr, "ana");
        mgr.disconnect(&pid("ana")).unwrap();

        let session = mgr.create(pid("ana")).expect("should replace");
        assert!(session.is_connected());
        mgr.disconnect(&pid("ana")).unwrap();

        assert!(matches!(mgr.reconnect(&old), Err(SessionError::InvalidToken)));
    }

    // =====================================================================
    // disconnect() / reconnect()
    // =====================================================================

    #[test]
    fn test_disconnect_unknown_player_returns_not_found() {
        let mut mgr = manager_with_long_grace();

        let result = mgr.disconnect(&pid("nadie"));

        assert!(matches!(result, Err(SessionError::NotFound(p)) if p == pid("nadie")));
    }

    #[test]
    fn test_reconnect_valid_token_restores_connected() {
        let mut mgr = manager_with_long_grace();
        let token = token_of(&mut mgr, "ana");
        mgr.disconnect(&pid("ana")).unwrap();

        let session = mgr.reconnect(&token).expect("should succeed");

        assert!(session.is_connected());
        assert_eq!(session.reconnect_token, token);
    }

    #[test]
    fn test_reconnect_keeps_current_match() {
        let mut mgr = manager_with_long_grace();
        let token = token_of(&mut mgr, "ana");
        mgr.set_current_match(&pid("ana"), Some(MatchId::new("m1")))
            .unwrap();
        mgr.disconnect(&pid("ana")).unwrap();

        let session = mgr.reconnect(&token).unwrap();

        assert_eq!(session.current_match, Some(MatchId::new("m1")));
    }

    #[test]
    fn test_reconnect_invalid_token_returns_error() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid("ana")).unwrap();
        mgr.disconnect(&pid("ana")).unwrap();

        let result = mgr.reconnect("not-a-real-token");

        assert!(matches!(result, Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_reconnect_after_grace_period_returns_expired() {
        let mut mgr = manager_with_instant_expiry();
        let token = token_of(&mut mgr, "ana");
        mgr.disconnect(&pid("ana")).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        let result = mgr.reconnect(&token);

        assert!(matches!(result, Err(SessionError::SessionExpired(p)) if p == pid("ana")));
    }

    #[test]
    fn test_reconnect_already_connected_returns_error() {
        let mut mgr = manager_with_long_grace();
        let token = token_of(&mut mgr, "ana");

        let result = mgr.reconnect(&token);

        assert!(matches!(result, Err(SessionError::AlreadyConnected(_))));
    }

    // =====================================================================
    // set_current_match()
    // =====================================================================

    #[test]
    fn test_set_current_match_unknown_player_returns_not_found() {
        let mut mgr = manager_with_long_grace();

        let result = mgr.set_current_match(&pid("nadie"), None);

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_set_current_match_clears_with_none() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid("ana")).unwrap();
        mgr.set_current_match(&pid("ana"), Some(MatchId::new("m1")))
            .unwrap();

        mgr.set_current_match(&pid("ana"), None).unwrap();

        assert!(mgr.get(&pid("ana")).unwrap().current_match.is_none());
    }

    // =====================================================================
    // expire_stale() / cleanup_expired()
    // =====================================================================

    #[test]
    fn test_expire_stale_only_touches_disconnected_sessions() {
        let mut mgr = manager_with_instant_expiry();
        mgr.create(pid("ana")).unwrap();
        mgr.create(pid("beto")).unwrap();
        mgr.disconnect(&pid("ana")).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        let expired = mgr.expire_stale();

        assert_eq!(expired, vec![pid("ana")]);
        assert!(mgr.get(&pid("beto")).unwrap().is_connected());
    }

    #[test]
    fn test_expire_stale_skips_sessions_within_grace() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid("ana")).unwrap();
        mgr.disconnect(&pid("ana")).unwrap();

        assert!(mgr.expire_stale().is_empty());
    }

    #[test]
    fn test_cleanup_expired_removes_session_and_token() {
        let mut mgr = manager_with_instant_expiry();
        let token = token_of(&mut mgr, "ana");
        mgr.create(pid("beto")).unwrap();
        mgr.disconnect(&pid("ana")).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        mgr.expire_stale();

        mgr.cleanup_expired();

        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(&pid("ana")).is_none());
        assert!(matches!(mgr.reconnect(&token), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_len_tracks_session_count() {
        let mut mgr = manager_with_long_grace();
        assert!(mgr.is_empty());

        mgr.create(pid("ana")).unwrap();
        mgr.create(pid("beto")).unwrap();

        assert_eq!(mgr.len(), 2);
    }
}
