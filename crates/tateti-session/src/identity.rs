//! The player identity provider: "who is using this client right now?"
//!
//! The match engine never authenticates anyone. It asks an
//! [`IdentityProvider`] for the current player's stable id before every
//! operation, and refuses to act when there is nobody signed in.

use tateti_protocol::PlayerId;

/// Answers with the stable id of the signed-in player, if any.
///
/// Implementations wrap whatever account system the deployment uses.
/// The answer may change over time (sign-out), so callers ask again
/// for every operation instead of caching it.
pub trait IdentityProvider: Send + Sync + 'static {
    fn current_player_id(&self) -> Option<PlayerId>;
}

/// An identity that never changes: always the given player, or nobody.
///
/// The server hands one of these to every authenticated connection.
/// Tests use [`FixedIdentity::anonymous`] to exercise the signed-out
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIdentity(Option<PlayerId>);

impl FixedIdentity {
    pub fn new(player_id: PlayerId) -> Self {
        Self(Some(player_id))
    }

    /// Nobody is signed in.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_player_id(&self) -> Option<PlayerId> {
        self.0.clone()
    }
}

impl<T: IdentityProvider> IdentityProvider for std::sync::Arc<T> {
    fn current_player_id(&self) -> Option<PlayerId> {
        (**self).current_player_id()
    }
}
