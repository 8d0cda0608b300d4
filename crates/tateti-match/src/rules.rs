//! Board rules: the eight lines, whose turn it is, and how a match ends.
//!
//! Everything is derived from `Match.moves` on every call. Nothing is
//! cached, so a snapshot that arrives from the store is always judged
//! by the same rules as one built locally.

use tateti_protocol::{Match, PlayerId, Position};

/// The eight winning lines as cell numbers: three rows, three columns,
/// two diagonals.
pub const LINES: [[u8; 3]; 8] = [
    [1, 2, 3],
    [4, 5, 6],
    [7, 8, 9],
    [1, 4, 7],
    [2, 5, 8],
    [3, 6, 9],
    [1, 5, 9],
    [3, 5, 7],
];

/// Cells a player has marked, one bit per position (bit `n` = cell `n`).
fn marks(m: &Match, player: &PlayerId) -> u16 {
    m.positions_of(player)
        .fold(0, |bits, position| bits | 1 << position.get())
}

fn line_bits(line: &[u8; 3]) -> u16 {
    line.iter().fold(0, |bits, cell| bits | 1 << cell)
}

fn line_positions(line: &[u8; 3]) -> [Position; 3] {
    // Every entry of LINES is in 1..=9, which ALL is indexed by.
    line.map(|cell| Position::ALL[usize::from(cell - 1)])
}

/// The first completed line and who owns it, if any.
///
/// Lines are checked for the challenger first, then the opponent. In a
/// match played by the rules only one of them can own a line.
pub fn winning_line(m: &Match) -> Option<(PlayerId, [Position; 3])> {
    let players = std::iter::once(&m.challenger).chain(m.opponent.as_ref());

    for player in players {
        let owned = marks(m, player);
        if let Some(line) = LINES
            .iter()
            .find(|line| owned & line_bits(line) == line_bits(line))
        {
            return Some((player.clone(), line_positions(line)));
        }
    }
    None
}

/// The owner of a completed line, if any.
pub fn winner_of(m: &Match) -> Option<PlayerId> {
    winning_line(m).map(|(player, _)| player)
}

/// A full board with no completed line.
pub fn is_draw(m: &Match) -> bool {
    m.moves.len() == Position::ALL.len() && winning_line(m).is_none()
}

/// A match is finished once it has a winner or the board is full.
pub fn is_finished(m: &Match) -> bool {
    m.winner.is_some() || m.moves.len() >= Position::ALL.len() || winning_line(m).is_some()
}

/// Who moves next, by ply parity: the challenger owns odd plies (1st,
/// 3rd, ...) and the opponent even ones. `None` when the next ply
/// belongs to an opponent who hasn't joined yet.
pub fn next_player(m: &Match) -> Option<&PlayerId> {
    if m.moves.len() % 2 == 0 {
        Some(&m.challenger)
    } else {
        m.opponent.as_ref()
    }
}
