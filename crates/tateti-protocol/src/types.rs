//! The match document and the identity types it is built from.
//!
//! Everything here travels "on the wire" twice: once into the shared
//! document store (where both players' clients read it back), and once
//! to remote clients of the session service. The JSON shape produced by
//! these types IS the contract between the two players, so the serde
//! attributes below are load-bearing and covered by tests.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable, opaque identifier for a player.
///
/// Issued by whatever identity provider sits in front of the service
/// (the uid of an auth account, a device id, ...). We never parse it;
/// we only compare it. Newtype wrapper so a `MatchId` can't be passed
/// where a `PlayerId` is expected.
///
/// `#[serde(transparent)]` makes `PlayerId("ana")` serialize as `"ana"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wraps any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The store-assigned key of a match document.
///
/// Absent until the match is persisted; once assigned it never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    /// Wraps any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Returned when a number outside `1..=9` is used as a board position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("position must be between 1 and 9, got {0}")]
pub struct InvalidPosition(pub u8);

/// One of the nine cells of the board.
///
/// Cells are numbered row by row:
///
/// ```text
///  1 | 2 | 3
/// ---+---+---
///  4 | 5 | 6
/// ---+---+---
///  7 | 8 | 9
/// ```
///
/// The inner value is private, so every `Position` in the program is
/// known to be valid. On the wire it is a plain integer; decoding an
/// out-of-range integer fails (`#[serde(try_from = "u8")]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Position(u8);

impl Position {
    /// All nine positions in board order.
    pub const ALL: [Position; 9] = [
        Position(1),
        Position(2),
        Position(3),
        Position(4),
        Position(5),
        Position(6),
        Position(7),
        Position(8),
        Position(9),
    ];

    /// Returns the position for `cell`, or `None` if it is not in `1..=9`.
    pub fn new(cell: u8) -> Option<Self> {
        (1..=9).contains(&cell).then_some(Self(cell))
    }

    /// The cell number, `1..=9`.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Position {
    type Error = InvalidPosition;

    fn try_from(cell: u8) -> Result<Self, Self::Error> {
        Self::new(cell).ok_or(InvalidPosition(cell))
    }
}

impl From<Position> for u8 {
    fn from(position: Position) -> u8 {
        position.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Move and Match
// ---------------------------------------------------------------------------

/// One ply: a mark placed on `position` by `player`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub position: Position,
    pub player: PlayerId,
}

impl Move {
    pub fn new(position: Position, player: PlayerId) -> Self {
        Self { position, player }
    }
}

/// The aggregate root: one game between a challenger and an opponent.
///
/// This struct is deliberately plain data. The rules that decide which
/// mutations are legal live in the engine crate; here we only describe
/// what a match looks like on the wire:
///
/// ```json
/// {
///   "id": "-NvT3k9x...",
///   "challenger": "ana",
///   "opponent": "beto",
///   "moves": [{ "position": 5, "player": "ana" }],
///   "winner": "ana"
/// }
/// ```
///
/// Optional fields are omitted rather than written as `null`, and a
/// document without `moves` decodes as an empty list. Both follow what a
/// realtime database hands back for sparse documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Store-assigned key. `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MatchId>,

    /// Who created the match. Always plays first ("X").
    pub challenger: PlayerId,

    /// Who joined second ("O"). Set at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<PlayerId>,

    /// Every ply in play order. Append-only.
    #[serde(default)]
    pub moves: Vec<Move>,

    /// Set at most once, when a line is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

impl Match {
    /// The most recent ply, if any.
    pub fn last_move(&self) -> Option<&Move> {
        self.moves.last()
    }

    /// Returns `true` if some move already targets `position`.
    pub fn is_occupied(&self, position: Position) -> bool {
        self.moves.iter().any(|m| m.position == position)
    }

    /// Returns `true` if `player` is the challenger or the opponent.
    pub fn is_participant(&self, player: &PlayerId) -> bool {
        self.challenger == *player || self.opponent.as_ref() == Some(player)
    }

    /// The positions `player` has marked, in play order.
    pub fn positions_of<'a>(
        &'a self,
        player: &'a PlayerId,
    ) -> impl Iterator<Item = Position> + 'a {
        self.moves
            .iter()
            .filter(move |m| m.player == *player)
            .map(|m| m.position)
    }
}

// ---------------------------------------------------------------------------
// MatchEvent: one delivery from a change feed
// ---------------------------------------------------------------------------

/// What happened to the document carried by a [`MatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Added,
    Changed,
    Removed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "Added"),
            Self::Changed => write!(f, "Changed"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}

/// A change notification: the kind of change plus the FULL snapshot.
///
/// Feeds may coalesce several writes into one delivery, so consumers
/// must rebuild their view from `snapshot` alone and never from a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub kind: EventKind,
    #[serde(rename = "match")]
    pub snapshot: Match,
}

// ---------------------------------------------------------------------------
// Standing: what a snapshot means for one reader
// ---------------------------------------------------------------------------

/// Where a match is in its lifecycle. Derived from the document alone;
/// never stored.
///
/// ```text
/// Created ──(opponent joins)──→ InProgress ──→ Won
///                                    └───────→ Drawn
/// ```
///
/// - **Created**: persisted with the challenger's first move, waiting
///   for an opponent.
/// - **InProgress**: both players present, no line, board not full.
/// - **Won** / **Drawn**: terminal. No further moves are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    Created,
    InProgress,
    Won,
    Drawn,
}

impl MatchState {
    /// Waiting for a second player.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Created)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Drawn)
    }

    /// Returns `true` if a match in `self` can later be in `target`.
    /// Observers may skip intermediate states, so `Created → Won` counts.
    /// Nothing leaves a terminal state.
    pub fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Created => target != Self::Created,
            Self::InProgress => target.is_terminal(),
            Self::Won | Self::Drawn => false,
        }
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Won => write!(f, "Won"),
            Self::Drawn => write!(f, "Drawn"),
        }
    }
}

/// How a finished match ended for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Victory,
    Defeat,
    Draw,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Victory => write!(f, "Victory"),
            Self::Defeat => write!(f, "Defeat"),
            Self::Draw => write!(f, "Draw"),
        }
    }
}

/// A snapshot read from one player's seat: lifecycle state, the
/// completed line if any, and the outcome for that player.
///
/// `verdict` is absent while the match is open and for observers who
/// aren't participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub state: MatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_line: Option<[Position; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

// =========================================================================
// Tests
// =========================================================================
