//! Authenticator for local play and tests.

use tateti_protocol::PlayerId;
use tateti_session::{Authenticator, SessionError};

/// Takes the handshake token as the player id. Anyone can claim any
/// name, so this is for development only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        let name = token.trim();
        if name.is_empty() {
            return Err(SessionError::AuthFailed("empty token".into()));
        }
        Ok(PlayerId::new(name))
    }
}
