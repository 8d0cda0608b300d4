//! The lobby: a live listing of every match in the collection.

use std::collections::BTreeMap;

use tateti_protocol::{EventKind, Match, MatchEvent, MatchId};
use tateti_store::DocumentStore;

use crate::state::state_of;
use crate::{EngineConfig, MatchError, MatchFeed, MatchRepository};

/// Tracks all matches through a collection-wide feed.
///
/// The map is rebuilt from full snapshots only, so coalesced or missed
/// intermediate versions don't matter.
pub struct MatchLobby<S> {
    repository: MatchRepository<S>,
    feed: Option<MatchFeed>,
    /// A feed that failed inside `next_event`, cancelled on the next call.
    retired: Option<MatchFeed>,
    matches: BTreeMap<MatchId, Match>,
}

impl<S: DocumentStore> MatchLobby<S> {
    /// Subscribes to the match collection. Existing matches arrive as
    /// `Added` events on the first calls to [`next_event`](Self::next_event).
    pub async fn open(store: S, config: &EngineConfig) -> Result<Self, MatchError> {
        let repository = MatchRepository::new(store, config.collection.clone());
        let feed = repository.watch_all().await?;
        Ok(Self {
            repository,
            feed: Some(feed),
            retired: None,
            matches: BTreeMap::new(),
        })
    }

    /// Waits for the next change and applies it to the listing.
    /// Pends forever once the lobby is closed. Cancel-safe.
    pub async fn next_event(&mut self) -> Result<MatchEvent, MatchError> {
        self.release_retired().await;
        let Some(feed) = self.feed.as_mut() else {
            return std::future::pending().await;
        };

        let event = match feed.next().await {
            Ok(event) => event,
            Err(e @ MatchError::MalformedDocument(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "lobby feed ended");
                self.retired = self.feed.take();
                return Err(e);
            }
        };

        if let Some(id) = event.snapshot.id.clone() {
            match event.kind {
                EventKind::Added | EventKind::Changed => {
                    self.matches.insert(id, event.snapshot.clone());
                }
                EventKind::Removed => {
                    self.matches.remove(&id);
                }
            }
        }
        Ok(event)
    }

    /// Matches still waiting for an opponent, oldest key first.
    pub fn open_matches(&self) -> impl Iterator<Item = &Match> {
        self.matches
            .values()
            .filter(|m| state_of(m).is_joinable())
    }

    pub fn get(&self, id: &MatchId) -> Option<&Match> {
        self.matches.get(id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Cancels the feed. The listing keeps its last contents.
    pub async fn close(&mut self) -> Result<(), MatchError> {
        self.release_retired().await;
        if let Some(feed) = self.feed.take() {
            self.repository.unwatch(feed).await?;
        }
        Ok(())
    }

    async fn release_retired(&mut self) {
        if let Some(feed) = self.retired.take() {
            if let Err(e) = self.repository.unwatch(feed).await {
                tracing::debug!(error = %e, "could not cancel retired lobby feed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tateti_protocol::{PlayerId, Position};
    use tateti_store::MemoryStore;

    use crate::engine;

    async fn next(lobby: &mut MatchLobby<MemoryStore>) -> MatchEvent {
        tokio::time::timeout(Duration::from_secs(1), lobby.next_event())
            .await
            .expect("timed out")
            .expect("lobby error")
    }

    #[tokio::test]
    async fn test_lobby_tracks_added_changed_removed() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let repo = MatchRepository::new(store.clone(), config.collection.clone());

        let existing = repo
            .create(&engine::start(PlayerId::new("ana"), Position::new(5).unwrap()))
            .await
            .unwrap();
        let mut lobby = MatchLobby::open(store.clone(), &config).await.unwrap();

        let first = next(&mut lobby).await;
        assert_eq!(first.kind, EventKind::Added);
        assert_eq!(lobby.open_matches().count(), 1);

        let id = existing.id.clone().unwrap();
        repo.record_opponent(&id, &PlayerId::new("beto"), None)
            .await
            .unwrap();
        let changed = next(&mut lobby).await;
        assert_eq!(changed.kind, EventKind::Changed);
        assert_eq!(lobby.open_matches().count(), 0);
        assert_eq!(lobby.get(&id).unwrap().opponent, Some(PlayerId::new("beto")));

        repo.remove(&id).await.unwrap();
        let removed = next(&mut lobby).await;
        assert_eq!(removed.kind, EventKind::Removed);
        assert!(lobby.is_empty());
    }

    #[tokio::test]
    async fn test_lobby_close_stops_feed() {
        let store = MemoryStore::new();
        let mut lobby = MatchLobby::open(store, &EngineConfig::default())
            .await
            .unwrap();

        lobby.close().await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(50), lobby.next_event()).await;
        assert!(waited.is_err(), "closed lobby must pend");
    }
}
