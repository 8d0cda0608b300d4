//! The per-client match session.
//!
//! A `MatchSession` is what one player's client drives: it holds at
//! most one match, keeps the latest snapshot of it, and owns the change
//! feed that keeps that snapshot current.
//!
//! ```text
//! start_match / open_match ──→ [holding match + feed] ──→ leave
//!                                   │      ↑
//!                             play  │      │ next_event
//!                                   ▼      │
//!                               DocumentStore
//! ```
//!
//! Validation always runs against the held snapshot before anything is
//! written. A rejected request never reaches the store.

use tateti_protocol::{EventKind, Match, MatchEvent, MatchId, MatchState, PlayerId, Position};
use tateti_session::IdentityProvider;
use tateti_store::{DocumentStore, Precondition, StoreError};

use crate::repository::{MOVES_FIELD, OPPONENT_FIELD};
use crate::state::state_of;
use crate::{EngineConfig, MatchError, MatchFeed, MatchRepository, MoveOutcome, engine};

/// One client's view of one match at a time.
pub struct MatchSession<S, I> {
    repository: MatchRepository<S>,
    identity: I,
    config: EngineConfig,
    current: Option<Match>,
    feed: Option<MatchFeed>,
    /// A feed that ended inside `next_event`, cancelled on the next call.
    retired: Option<MatchFeed>,
}

impl<S: DocumentStore, I: IdentityProvider> MatchSession<S, I> {
    pub fn new(store: S, identity: I, config: EngineConfig) -> Self {
        Self {
            repository: MatchRepository::new(store, config.collection.clone()),
            identity,
            config,
            current: None,
            feed: None,
            retired: None,
        }
    }

    /// The latest snapshot of the held match.
    pub fn current(&self) -> Option<&Match> {
        self.current.as_ref()
    }

    /// Lifecycle state of the held match.
    pub fn state(&self) -> Option<MatchState> {
        self.current.as_ref().map(state_of)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn caller(&self) -> Result<PlayerId, MatchError> {
        self.identity
            .current_player_id()
            .ok_or(MatchError::UnauthenticatedCaller)
    }

    fn ensure_idle(&self) -> Result<(), MatchError> {
        match self.current {
            Some(_) => Err(MatchError::SessionBusy),
            None => Ok(()),
        }
    }

    /// Creates a match with the caller as challenger and `position` as
    /// the first move, persists it, and starts observing it.
    pub async fn start_match(&mut self, position: Position) -> Result<Match, MatchError> {
        let player = self.caller()?;
        self.ensure_idle()?;
        self.release_retired().await;

        let created = self
            .repository
            .create(&engine::start(player.clone(), position))
            .await?;
        let match_id = created.id.clone().ok_or(MatchError::MissingMatchId)?;
        let feed = self.repository.watch(&match_id).await?;

        tracing::info!(%match_id, challenger = %player, %position, "match created");

        self.feed = Some(feed);
        self.current = Some(created.clone());
        Ok(created)
    }

    /// Starts observing an existing match. If the opponent slot is free
    /// and the caller isn't the challenger, the caller joins as
    /// opponent. Opening a match you're already in (or watching one
    /// that's full) only observes it.
    pub async fn open_match(&mut self, match_id: &MatchId) -> Result<Match, MatchError> {
        let player = self.caller()?;
        self.ensure_idle()?;
        self.release_retired().await;

        let mut m = self
            .repository
            .load(match_id)
            .await?
            .ok_or_else(|| MatchError::MatchNotFound(match_id.clone()))?;

        if m.opponent.is_none() && m.challenger != player {
            engine::join(&mut m, player.clone())?;

            let precondition = self.config.is_optimistic().then(|| Precondition::FieldAbsent {
                field: OPPONENT_FIELD.to_string(),
            });
            self.repository
                .record_opponent(match_id, &player, precondition)
                .await
                .map_err(|e| match e {
                    MatchError::Store(StoreError::PreconditionFailed { .. }) => {
                        MatchError::OpponentSlotTaken
                    }
                    other => other,
                })?;

            tracing::info!(%match_id, opponent = %player, "opponent joined");
        } else {
            tracing::debug!(%match_id, %player, "observing match");
        }

        let feed = self.repository.watch(match_id).await?;
        self.feed = Some(feed);
        self.current = Some(m.clone());
        Ok(m)
    }

    /// Marks `position` for the caller in the held match.
    ///
    /// `observed_moves` is the move count the caller's UI showed. When
    /// given, the move is refused if the held snapshot disagrees. In
    /// optimistic mode the store also refuses the write if another
    /// client got there first; the held snapshot is then refreshed.
    pub async fn play(
        &mut self,
        position: Position,
        observed_moves: Option<usize>,
    ) -> Result<MoveOutcome, MatchError> {
        let player = self.caller()?;
        let held = self.current.as_ref().ok_or(MatchError::NoActiveMatch)?;

        let observed = held.moves.len();
        let mut next = held.clone();
        let outcome = engine::apply_move(&mut next, &player, position, observed_moves)?;

        let precondition = self.config.is_optimistic().then(|| Precondition::FieldLength {
            field: MOVES_FIELD.to_string(),
            len: observed,
        });

        match self.repository.record_moves(&next, precondition).await {
            Ok(()) => {}
            Err(MatchError::Store(StoreError::PreconditionFailed { .. })) => {
                return Err(self.refresh_after_conflict(observed).await);
            }
            Err(e) => return Err(e),
        }

        let match_id = next.id.clone().ok_or(MatchError::MissingMatchId)?;
        match &outcome {
            MoveOutcome::Won(winner) => {
                tracing::info!(%match_id, %winner, moves = next.moves.len(), "match won");
            }
            MoveOutcome::Drawn => tracing::info!(%match_id, "match drawn"),
            MoveOutcome::Continue => {
                tracing::debug!(%match_id, %player, %position, "move recorded");
            }
        }

        self.current = Some(next);
        Ok(outcome)
    }

    /// Reloads the held match after losing a write race and reports how
    /// far it had moved on.
    async fn refresh_after_conflict(&mut self, observed: usize) -> MatchError {
        let Some(match_id) = self.current.as_ref().and_then(|m| m.id.clone()) else {
            return MatchError::MissingMatchId;
        };
        match self.repository.load(&match_id).await {
            Ok(Some(latest)) => {
                let actual = latest.moves.len();
                tracing::debug!(%match_id, observed, actual, "lost write race");
                self.current = Some(latest);
                MatchError::StaleMatch { observed, actual }
            }
            Ok(None) => MatchError::MatchNotFound(match_id),
            Err(e) => e,
        }
    }

    /// Waits for the next change to the held match and adopts its
    /// snapshot.
    ///
    /// With no match held this never resolves, so it can sit in a
    /// `tokio::select!` next to other sources. Cancel-safe: an event is
    /// handed back without awaiting anything after it arrives.
    ///
    /// A `Removed` event or a feed failure ends observation: the held
    /// match is dropped and its feed is cancelled at the start of the
    /// next call (or by [`leave`](Self::leave)).
    pub async fn next_event(&mut self) -> Result<MatchEvent, MatchError> {
        self.release_retired().await;
        let Some(feed) = self.feed.as_mut() else {
            return std::future::pending().await;
        };

        match feed.next().await {
            Ok(event) => {
                if event.kind == EventKind::Removed {
                    tracing::info!(match_id = ?event.snapshot.id, "match removed");
                    self.retire_feed();
                } else {
                    self.adopt(event.snapshot.clone());
                }
                Ok(event)
            }
            Err(e @ MatchError::MalformedDocument(_)) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "match feed ended");
                self.retire_feed();
                Err(e)
            }
        }
    }

    /// Replaces the held snapshot with one from the feed. The store is
    /// authoritative, so a snapshot that moved backwards is still taken.
    fn adopt(&mut self, snapshot: Match) {
        if let Some(held) = &self.current {
            let (from, to) = (state_of(held), state_of(&snapshot));
            if from != to && !from.can_transition_to(to) {
                tracing::warn!(match_id = ?snapshot.id, %from, %to, "match snapshot went backwards");
            } else if to.is_terminal() && !from.is_terminal() {
                tracing::info!(match_id = ?snapshot.id, state = %to, "match over");
            }
        }
        self.current = Some(snapshot);
    }

    fn retire_feed(&mut self) {
        self.current = None;
        self.retired = self.feed.take();
    }

    /// Cancels a feed retired by `next_event`. The feed is already over
    /// for this session, so a failure is only logged.
    async fn release_retired(&mut self) {
        if let Some(feed) = self.retired.take() {
            if let Err(e) = self.repository.unwatch(feed).await {
                tracing::debug!(error = %e, "could not cancel retired match feed");
            }
        }
    }

    /// Stops observing the held match and returns its last snapshot.
    /// The subscription is cancelled before this returns.
    pub async fn leave(&mut self) -> Result<Option<Match>, MatchError> {
        self.release_retired().await;
        let previous = self.current.take();
        if let Some(feed) = self.feed.take() {
            self.repository.unwatch(feed).await?;
        }
        if let Some(m) = &previous {
            tracing::debug!(match_id = ?m.id, "left match");
        }
        Ok(previous)
    }
}
