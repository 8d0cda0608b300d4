//! Error types for the match layer.

use tateti_protocol::{MatchId, Position, RejectReason};
use tateti_store::StoreError;

/// Everything a match operation can fail with.
///
/// The first group are local decisions: the engine refuses the request
/// before anything is written, and the shared document is untouched.
/// `Store` is the only variant that comes from I/O.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// It is not the caller's turn.
    #[error("not your turn")]
    InvalidTurn,

    #[error("position {0} is already taken")]
    OccupiedCell(Position),

    /// The match has a winner or a full board.
    #[error("match already finished")]
    MatchAlreadyFinished,

    #[error("match already has an opponent")]
    OpponentSlotTaken,

    #[error("cannot join your own match")]
    CannotJoinOwnMatch,

    /// The caller is neither challenger nor opponent.
    #[error("not a participant of this match")]
    NotAParticipant,

    /// The match moved on since the caller last looked at it.
    #[error("stale match: observed {observed} moves, found {actual}")]
    StaleMatch { observed: usize, actual: usize },

    /// The identity provider reports nobody signed in.
    #[error("no player is signed in")]
    UnauthenticatedCaller,

    /// This session is already holding a match; leave it first.
    #[error("session already holds a match")]
    SessionBusy,

    #[error("no active match")]
    NoActiveMatch,

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// A snapshot that should have come from the store carries no key.
    #[error("match snapshot has no id")]
    MissingMatchId,

    /// A stored document doesn't decode as a match.
    #[error("malformed match document: {0}")]
    MalformedDocument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MatchError {
    /// The wire-level reason for a local rejection, or `None` for
    /// failures that aren't the caller's fault.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        let reason = match self {
            Self::InvalidTurn => RejectReason::InvalidTurn,
            Self::OccupiedCell(_) => RejectReason::OccupiedCell,
            Self::MatchAlreadyFinished => RejectReason::MatchAlreadyFinished,
            Self::OpponentSlotTaken => RejectReason::OpponentSlotTaken,
            Self::CannotJoinOwnMatch => RejectReason::CannotJoinOwnMatch,
            Self::NotAParticipant => RejectReason::NotAParticipant,
            Self::StaleMatch { .. } => RejectReason::StaleMatch,
            Self::UnauthenticatedCaller => RejectReason::Unauthenticated,
            Self::SessionBusy => RejectReason::SessionBusy,
            Self::NoActiveMatch => RejectReason::NoActiveMatch,
            Self::MatchNotFound(_) => RejectReason::MatchNotFound,
            Self::MissingMatchId | Self::MalformedDocument(_) | Self::Store(_) => return None,
        };
        Some(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_for_local_decisions() {
        let cell = Position::new(5).unwrap();
        assert_eq!(
            MatchError::OccupiedCell(cell).reject_reason(),
            Some(RejectReason::OccupiedCell)
        );
        assert_eq!(
            MatchError::StaleMatch { observed: 1, actual: 2 }.reject_reason(),
            Some(RejectReason::StaleMatch)
        );
        assert_eq!(
            MatchError::UnauthenticatedCaller.reject_reason(),
            Some(RejectReason::Unauthenticated)
        );
    }

    #[test]
    fn test_reject_reason_none_for_store_failures() {
        assert_eq!(MatchError::Store(StoreError::Unavailable).reject_reason(), None);
        assert_eq!(MatchError::MalformedDocument("x".into()).reject_reason(), None);
    }

    #[test]
    fn test_missing_id_is_not_reported_as_no_active_match() {
        assert_eq!(MatchError::MissingMatchId.reject_reason(), None);
        assert_eq!(MatchError::MissingMatchId.to_string(), "match snapshot has no id");
    }

    #[test]
    fn test_store_error_converts() {
        let err: MatchError = StoreError::Unavailable.into();
        assert!(matches!(err, MatchError::Store(StoreError::Unavailable)));
        assert_eq!(err.to_string(), "document store is unavailable");
    }
}
