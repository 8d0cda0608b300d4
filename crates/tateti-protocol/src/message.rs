//! Messages exchanged between remote clients and the session service.
//!
//! Every frame is an [`Envelope`] carrying either a [`ClientMessage`]
//! (client → server) or a [`ServerMessage`] (server → client). Both
//! enums are internally tagged, so a frame looks like:
//!
//! ```json
//! { "seq": 3, "timestamp": 1200,
//!   "payload": { "type": "Play", "position": 5, "observed_moves": 2 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{Match, MatchEvent, MatchId, PlayerId, Position, Standing};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level frame. Metadata outside, message inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Per-direction sequence number. Each side keeps its own counter.
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,

    /// The message itself.
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(seq: u64, timestamp: u64, payload: T) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Requests a client can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Must be the first frame. `token` is handed to the authenticator;
    /// `resume` is the session token from a previous `HandshakeAck`.
    Handshake {
        version: u32,
        token: Option<String>,
        #[serde(default)]
        resume: Option<String>,
    },

    /// Create a new match with the caller as challenger, marking
    /// `position` as the first move.
    StartMatch { position: Position },

    /// Observe an existing match, joining it as opponent when the slot
    /// is free and the caller isn't the challenger.
    OpenMatch { match_id: MatchId },

    /// Mark `position` in the current match. `observed_moves` is the
    /// move count the client last saw; when present the move is
    /// rejected if the match has moved on since.
    Play {
        position: Position,
        #[serde(default)]
        observed_moves: Option<usize>,
    },

    /// Stop observing the current match.
    LeaveMatch,

    /// Start receiving `LobbyUpdate`s for every match.
    WatchLobby,

    /// Stop receiving `LobbyUpdate`s.
    UnwatchLobby,

    /// Keep-alive. `client_time` is echoed back for RTT calculation.
    Heartbeat { client_time: u64 },

    /// "I'm leaving." Closes the connection.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Why a request was turned down. Mirrors the engine's local decisions
/// so a client can show "not your turn", "cell taken" and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InvalidTurn,
    OccupiedCell,
    MatchAlreadyFinished,
    OpponentSlotTaken,
    CannotJoinOwnMatch,
    NotAParticipant,
    StaleMatch,
    Unauthenticated,
    SessionBusy,
    NoActiveMatch,
    MatchNotFound,
}

/// Everything the server can push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake accepted. Keep `session_token` to resume after a drop.
    HandshakeAck {
        player_id: PlayerId,
        server_time: u64,
        session_token: String,
        /// `true` when the `resume` token re-attached an old session.
        resumed: bool,
    },

    /// A request went through. Carries the match as the caller now
    /// sees it and its standing from the caller's seat (both absent
    /// for requests that leave no match, like `LeaveMatch`).
    Accepted {
        snapshot: Option<Match>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        standing: Option<Standing>,
    },

    /// A request was refused before anything was written.
    Rejected {
        reason: RejectReason,
        message: String,
    },

    /// A change to the match this client is observing, with the
    /// standing of the new snapshot from this client's seat.
    MatchUpdate { event: MatchEvent, standing: Standing },

    /// A change anywhere in the match collection (after `WatchLobby`).
    LobbyUpdate { event: MatchEvent },

    /// Reply to `Heartbeat`.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Something went wrong that isn't a game-rule rejection.
    /// `code` follows HTTP conventions (400, 401, 503, ...).
    Error { code: u16, message: String },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventKind, MatchState, Move};

    #[test]
    fn test_client_play_json_format() {
        let msg = ClientMessage::Play {
            position: Position::new(5).unwrap(),
            observed_moves: Some(2),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Play");
        assert_eq!(json["position"], 5);
        assert_eq!(json["observed_moves"], 2);
    }

    #[test]
    fn test_client_play_without_observed_moves_decodes() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"Play","position":3}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Play {
                position: Position::new(3).unwrap(),
                observed_moves: None,
            }
        );
    }

    #[test]
    fn test_client_play_out_of_range_position_fails() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"Play","position":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_handshake_resume_defaults_to_none() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"Handshake","version":1,"token":"ana"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Handshake { resume: None, .. }
        ));
    }

    #[test]
    fn test_client_open_match_json_format() {
        let msg = ClientMessage::OpenMatch {
            match_id: MatchId::new("m-7"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "OpenMatch");
        assert_eq!(json["match_id"], "m-7");
    }

    #[test]
    fn test_server_rejected_json_format() {
        let msg = ServerMessage::Rejected {
            reason: RejectReason::InvalidTurn,
            message: "not your turn".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Rejected");
        assert_eq!(json["reason"], "InvalidTurn");
    }

    #[test]
    fn test_server_match_update_carries_full_snapshot() {
        let ana = PlayerId::new("ana");
        let msg = ServerMessage::MatchUpdate {
            event: MatchEvent {
                kind: EventKind::Changed,
                snapshot: Match {
                    id: Some(MatchId::new("m1")),
                    challenger: ana.clone(),
                    opponent: None,
                    moves: vec![Move::new(Position::new(1).unwrap(), ana)],
                    winner: None,
                },
            },
            standing: Standing {
                state: MatchState::Created,
                winning_line: None,
                verdict: None,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "MatchUpdate");
        assert_eq!(json["event"]["kind"], "Changed");
        assert_eq!(json["event"]["match"]["moves"][0]["position"], 1);
        assert_eq!(json["standing"]["state"], "Created");
        assert!(json["standing"].get("verdict").is_none());
    }

    #[test]
    fn test_server_accepted_without_match_omits_standing() {
        let msg = ServerMessage::Accepted {
            snapshot: None,
            standing: None,
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Accepted");
        assert!(json["snapshot"].is_null());
        assert!(json.get("standing").is_none());
    }

    #[test]
    fn test_envelope_wraps_payload() {
        let env = Envelope::new(4, 900, ClientMessage::LeaveMatch);
        let json = serde_json::to_value(&env).unwrap();

        assert_eq!(json["seq"], 4);
        assert_eq!(json["timestamp"], 900);
        assert_eq!(json["payload"]["type"], "LeaveMatch");
    }

    #[test]
    fn test_decode_unknown_client_message_type_returns_error() {
        let unknown = r#"{"type":"FlipBoard"}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}
