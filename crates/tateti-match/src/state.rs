//! Reading lifecycle state and per-player outcome off a snapshot.
//!
//! The vocabulary ([`MatchState`], [`Verdict`], [`Standing`]) lives in
//! `tateti-protocol` so it can go out on the wire. Deriving it needs the
//! rules, so that part lives here.

use tateti_protocol::{Match, MatchState, PlayerId, Standing, Verdict};

use crate::rules;

/// Reads the lifecycle state off a snapshot.
pub fn state_of(m: &Match) -> MatchState {
    if m.winner.is_some() || rules::winning_line(m).is_some() {
        MatchState::Won
    } else if rules::is_draw(m) {
        MatchState::Drawn
    } else if m.opponent.is_none() {
        MatchState::Created
    } else {
        MatchState::InProgress
    }
}

/// The outcome from `player`'s point of view. `None` while the match
/// is still open, or if `player` didn't take part.
pub fn verdict_for(m: &Match, player: &PlayerId) -> Option<Verdict> {
    if !m.is_participant(player) {
        return None;
    }
    match state_of(m) {
        MatchState::Won => {
            let winner = m.winner.clone().or_else(|| rules::winner_of(m))?;
            Some(if winner == *player {
                Verdict::Victory
            } else {
                Verdict::Defeat
            })
        }
        MatchState::Drawn => Some(Verdict::Draw),
        MatchState::Created | MatchState::InProgress => None,
    }
}

/// Everything a client needs to render `m` from `player`'s seat.
pub fn standing_for(m: &Match, player: &PlayerId) -> Standing {
    Standing {
        state: state_of(m),
        winning_line: rules::winning_line(m).map(|(_, line)| line),
        verdict: verdict_for(m, player),
    }
}
