//! Unified error type for the Tateti service.

use tateti_match::MatchError;
use tateti_protocol::ProtocolError;
use tateti_session::SessionError;
use tateti_store::StoreError;

use crate::TransportError;

/// Top-level error that wraps every crate-specific error, so `?` works
/// across layers inside the service.
#[derive(Debug, thiserror::Error)]
pub enum TatetiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or session bookkeeping failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
