//! Authentication hook for the service handshake.
//!
//! Tateti doesn't register or sign in users. A remote client presents
//! a token it got from some identity service; an [`Authenticator`]
//! turns that token into a [`PlayerId`] or refuses it.

use tateti_protocol::PlayerId;

use crate::SessionError;

/// Validates a client's token and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use tateti_protocol::PlayerId;
/// use tateti_session::{Authenticator, SessionError};
///
/// /// Trusts the token as the player id. Development only.
/// struct TrustingAuthenticator;
///
/// impl Authenticator for TrustingAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::AuthFailed("empty token".into()));
///         }
///         Ok(PlayerId::new(token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the player the token belongs to.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] if the token is invalid or expired.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}
