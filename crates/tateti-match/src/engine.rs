//! Pure match transitions: start, join, move.
//!
//! No I/O here. Each function validates against the snapshot it is
//! given and either mutates it or returns an error having touched
//! nothing. Persisting the result is the caller's job.

use tateti_protocol::{Match, Move, PlayerId, Position};

use crate::{MatchError, rules};

/// What an accepted move did to the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The match goes on.
    Continue,
    /// The move completed a line for this player.
    Won(PlayerId),
    /// The move filled the board without a line.
    Drawn,
}

/// A fresh match: `player` is the challenger and has marked `position`.
pub fn start(player: PlayerId, position: Position) -> Match {
    Match {
        id: None,
        challenger: player.clone(),
        opponent: None,
        moves: vec![Move::new(position, player)],
        winner: None,
    }
}

/// Takes the opponent slot.
///
/// # Errors
/// - [`MatchError::OpponentSlotTaken`]: someone already joined
/// - [`MatchError::CannotJoinOwnMatch`]: `player` is the challenger
pub fn join(m: &mut Match, player: PlayerId) -> Result<(), MatchError> {
    if m.opponent.is_some() {
        return Err(MatchError::OpponentSlotTaken);
    }
    if m.challenger == player {
        return Err(MatchError::CannotJoinOwnMatch);
    }
    m.opponent = Some(player);
    Ok(())
}

/// Validates and applies one move.
///
/// `observed_moves` is an optional freshness token: the number of moves
/// the caller saw when deciding. If the match has a different count the
/// move is refused as stale.
///
/// Checks run in this order, and the first failure wins:
///
/// 1. the match isn't finished
/// 2. the freshness token, when given, matches
/// 3. it is the caller's turn
/// 4. the cell is free
///
/// On success the move is appended, the lines are re-evaluated, and
/// `winner` is set if the move completed one.
pub fn apply_move(
    m: &mut Match,
    player: &PlayerId,
    position: Position,
    observed_moves: Option<usize>,
) -> Result<MoveOutcome, MatchError> {
    if rules::is_finished(m) {
        return Err(MatchError::MatchAlreadyFinished);
    }

    if let Some(observed) = observed_moves {
        if observed != m.moves.len() {
            return Err(MatchError::StaleMatch {
                observed,
                actual: m.moves.len(),
            });
        }
    }

    check_turn(m, player)?;

    if m.is_occupied(position) {
        return Err(MatchError::OccupiedCell(position));
    }

    m.moves.push(Move::new(position, player.clone()));

    if let Some(winner) = rules::winner_of(m) {
        m.winner = Some(winner.clone());
        return Ok(MoveOutcome::Won(winner));
    }
    if rules::is_draw(m) {
        return Ok(MoveOutcome::Drawn);
    }
    Ok(MoveOutcome::Continue)
}

fn check_turn(m: &Match, player: &PlayerId) -> Result<(), MatchError> {
    if !m.is_participant(player) {
        return Err(MatchError::NotAParticipant);
    }
    if m.last_move().is_some_and(|last| last.player == *player) {
        return Err(MatchError::InvalidTurn);
    }
    match rules::next_player(m) {
        Some(next) if next == player => Ok(()),
        _ => Err(MatchError::InvalidTurn),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> PlayerId {
        PlayerId::new("ana")
    }

    fn beto() -> PlayerId {
        PlayerId::new("beto")
    }

    fn carla() -> PlayerId {
        PlayerId::new("carla")
    }

    fn pos(cell: u8) -> Position {
        Position::new(cell).unwrap()
    }

    /// ana opened on `first`, beto joined.
    fn joined(first: u8) -> Match {
        let mut m = start(ana(), pos(first));
        join(&mut m, beto()).unwrap();
        m
    }

    /// Plays `cells` alternately, starting with whoever is next.
    fn play_all(m: &mut Match, cells: &[u8]) -> Vec<MoveOutcome> {
        cells
            .iter()
            .map(|&cell| {
                let player = rules::next_player(m).cloned().unwrap();
                apply_move(m, &player, pos(cell), None).unwrap()
            })
            .collect()
    }

    // =====================================================================
    // start() / join()
    // =====================================================================

    #[test]
    fn test_start_records_first_move_by_challenger() {
        let m = start(ana(), pos(5));

        assert_eq!(m.challenger, ana());
        assert_eq!(m.moves, vec![Move::new(pos(5), ana())]);
        assert!(m.id.is_none());
        assert!(m.opponent.is_none());
        assert!(m.winner.is_none());
    }

    #[test]
    fn test_join_sets_opponent() {
        let mut m = start(ana(), pos(1));
        join(&mut m, beto()).unwrap();
        assert_eq!(m.opponent, Some(beto()));
    }

    #[test]
    fn test_join_own_match_is_rejected() {
        let mut m = start(ana(), pos(1));
        assert!(matches!(join(&mut m, ana()), Err(MatchError::CannotJoinOwnMatch)));
        assert!(m.opponent.is_none());
    }

    #[test]
    fn test_join_twice_keeps_first_opponent() {
        let mut m = start(ana(), pos(1));
        join(&mut m, beto()).unwrap();

        assert!(matches!(join(&mut m, carla()), Err(MatchError::OpponentSlotTaken)));
        assert!(matches!(join(&mut m, beto()), Err(MatchError::OpponentSlotTaken)));
        assert_eq!(m.opponent, Some(beto()));
    }

    // =====================================================================
    // apply_move(): accepted moves
    // =====================================================================

    #[test]
    fn test_apply_move_alternates_from_challenger() {
        let mut m = joined(1);
        play_all(&mut m, &[5, 9, 3]);

        assert_eq!(m.moves.len(), 4);
        for (ply, mv) in m.moves.iter().enumerate() {
            let expected = if ply % 2 == 0 { ana() } else { beto() };
            assert_eq!(mv.player, expected, "ply {ply}");
        }
    }

    #[test]
    fn test_apply_move_every_prefix_of_a_drawn_game() {
        // X O X / X O O / O X X, played in this order.
        let cells = [1, 2, 3, 5, 4, 6, 8, 7, 9];
        for k in 1..=cells.len() {
            let mut m = joined(cells[0]);
            play_all(&mut m, &cells[1..k]);
            assert_eq!(m.moves.len(), k);
            assert!(m.winner.is_none());
        }
    }

    #[test]
    fn test_apply_move_completing_a_line_sets_winner() {
        let mut m = joined(1);
        let outcomes = play_all(&mut m, &[4, 2, 5, 3]);

        assert_eq!(outcomes.last(), Some(&MoveOutcome::Won(ana())));
        assert_eq!(m.winner, Some(ana()));
    }

    #[test]
    fn test_apply_move_line_in_any_order_wins() {
        // ana marks 3, then 1, then 2.
        let mut m = joined(3);
        let outcomes = play_all(&mut m, &[7, 1, 9, 2]);

        assert_eq!(outcomes.last(), Some(&MoveOutcome::Won(ana())));
    }

    #[test]
    fn test_apply_move_opponent_can_win() {
        let mut m = joined(1);
        let outcomes = play_all(&mut m, &[5, 2, 3, 9, 7]);

        assert_eq!(outcomes.last(), Some(&MoveOutcome::Won(beto())));
        assert_eq!(m.winner, Some(beto()));
    }

    #[test]
    fn test_apply_move_full_board_without_line_is_drawn() {
        let mut m = joined(1);
        let outcomes = play_all(&mut m, &[2, 3, 5, 4, 6, 8, 7, 9]);

        assert_eq!(outcomes.last(), Some(&MoveOutcome::Drawn));
        assert_eq!(m.moves.len(), 9);
        assert!(m.winner.is_none());
    }

    #[test]
    fn test_apply_move_matching_observed_count_is_accepted() {
        let mut m = joined(1);
        let outcome = apply_move(&mut m, &beto(), pos(5), Some(1)).unwrap();
        assert_eq!(outcome, MoveOutcome::Continue);
    }

    // =====================================================================
    // apply_move(): rejections leave the match untouched
    // =====================================================================

    #[test]
    fn test_apply_move_occupied_cell_is_rejected() {
        let mut m = joined(5);
        let before = m.clone();

        let result = apply_move(&mut m, &beto(), pos(5), None);

        assert!(matches!(result, Err(MatchError::OccupiedCell(p)) if p == pos(5)));
        assert_eq!(m, before);
    }

    #[test]
    fn test_apply_move_out_of_turn_is_rejected() {
        let mut m = joined(1);
        let before = m.clone();

        let result = apply_move(&mut m, &ana(), pos(2), None);

        assert!(matches!(result, Err(MatchError::InvalidTurn)));
        assert_eq!(m, before);
    }

    #[test]
    fn test_apply_move_out_of_turn_checked_before_occupancy() {
        let mut m = joined(1);
        let result = apply_move(&mut m, &ana(), pos(1), None);
        assert!(matches!(result, Err(MatchError::InvalidTurn)));
    }

    #[test]
    fn test_apply_move_before_opponent_joins() {
        let mut m = start(ana(), pos(1));

        let again = apply_move(&mut m, &ana(), pos(2), None);
        let stranger = apply_move(&mut m, &carla(), pos(2), None);

        assert!(matches!(again, Err(MatchError::InvalidTurn)));
        assert!(matches!(stranger, Err(MatchError::NotAParticipant)));
        assert_eq!(m.moves.len(), 1);
    }

    #[test]
    fn test_apply_move_by_outsider_is_rejected() {
        let mut m = joined(1);
        let result = apply_move(&mut m, &carla(), pos(2), None);
        assert!(matches!(result, Err(MatchError::NotAParticipant)));
    }

    #[test]
    fn test_apply_move_stale_token_is_rejected() {
        let mut m = joined(1);
        play_all(&mut m, &[5]);
        let before = m.clone();

        let result = apply_move(&mut m, &ana(), pos(9), Some(1));

        assert!(matches!(
            result,
            Err(MatchError::StaleMatch { observed: 1, actual: 2 })
        ));
        assert_eq!(m, before);
    }

    #[test]
    fn test_apply_move_after_win_is_rejected_for_everyone() {
        let mut m = joined(1);
        play_all(&mut m, &[4, 2, 5, 3]);
        let before = m.clone();

        for player in [ana(), beto()] {
            let result = apply_move(&mut m, &player, pos(9), None);
            assert!(matches!(result, Err(MatchError::MatchAlreadyFinished)));
        }
        assert_eq!(m, before);
    }

    #[test]
    fn test_apply_move_after_draw_is_rejected() {
        let mut m = joined(1);
        play_all(&mut m, &[2, 3, 5, 4, 6, 8, 7, 9]);

        let result = apply_move(&mut m, &beto(), pos(1), None);

        assert!(matches!(result, Err(MatchError::MatchAlreadyFinished)));
    }

    #[test]
    fn test_apply_move_finished_checked_before_stale_token() {
        let mut m = joined(1);
        play_all(&mut m, &[4, 2, 5, 3]);
        let result = apply_move(&mut m, &beto(), pos(9), Some(0));
        assert!(matches!(result, Err(MatchError::MatchAlreadyFinished)));
    }

    #[test]
    fn test_apply_move_every_position_is_exclusive() {
        // Whatever was played, replaying any marked cell is refused.
        let mut m = joined(1);
        play_all(&mut m, &[5, 9, 3]);
        for mv in m.moves.clone() {
            let next = rules::next_player(&m).cloned().unwrap();
            let result = apply_move(&mut m, &next, mv.position, None);
            assert!(matches!(result, Err(MatchError::OccupiedCell(_))));
        }
        assert_eq!(m.moves.len(), 4);
    }
}
