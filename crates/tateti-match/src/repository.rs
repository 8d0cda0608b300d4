//! Typed access to match documents in a [`DocumentStore`].
//!
//! The repository is the only place that knows matches live as JSON
//! objects in a named collection. It writes the fields the engine
//! changed (never the whole document after creation) and decodes every
//! snapshot that comes back, taking the match id from the store key.

use serde_json::{Map, Value};
use tateti_protocol::{Match, MatchEvent, MatchId, PlayerId};
use tateti_store::{DocumentStore, Precondition, StoreError, StoreEvent, Subscription};

use crate::MatchError;

/// Field names of the persisted document.
pub(crate) const OPPONENT_FIELD: &str = "opponent";
pub(crate) const MOVES_FIELD: &str = "moves";
pub(crate) const WINNER_FIELD: &str = "winner";

/// Reads and writes matches in one collection.
#[derive(Clone)]
pub struct MatchRepository<S> {
    store: S,
    collection: String,
}

impl<S: DocumentStore> MatchRepository<S> {
    pub fn new(store: S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Persists a new match under a fresh key and returns it with its id.
    pub async fn create(&self, m: &Match) -> Result<Match, MatchError> {
        let key = self.store.create(&self.collection).await?;

        let mut created = m.clone();
        created.id = None;
        self.store
            .set(&self.collection, &key, encode(&created)?)
            .await?;

        created.id = Some(MatchId::new(key));
        Ok(created)
    }

    /// Point read. `Ok(None)` if no such match.
    pub async fn load(&self, id: &MatchId) -> Result<Option<Match>, MatchError> {
        self.store
            .get(&self.collection, id.as_str())
            .await?
            .map(|document| decode(id.as_str(), document))
            .transpose()
    }

    /// Writes only the `opponent` field.
    pub async fn record_opponent(
        &self,
        id: &MatchId,
        player: &PlayerId,
        precondition: Option<Precondition>,
    ) -> Result<(), MatchError> {
        let mut fields = Map::new();
        fields.insert(OPPONENT_FIELD.to_string(), to_json(player)?);
        self.store
            .update(&self.collection, id.as_str(), fields, precondition)
            .await?;
        Ok(())
    }

    /// Writes `moves` and, once set, `winner`, in a single update.
    pub async fn record_moves(
        &self,
        m: &Match,
        precondition: Option<Precondition>,
    ) -> Result<(), MatchError> {
        let id = m.id.as_ref().ok_or(MatchError::MissingMatchId)?;

        let mut fields = Map::new();
        fields.insert(MOVES_FIELD.to_string(), to_json(&m.moves)?);
        if let Some(winner) = &m.winner {
            fields.insert(WINNER_FIELD.to_string(), to_json(winner)?);
        }

        self.store
            .update(&self.collection, id.as_str(), fields, precondition)
            .await?;
        Ok(())
    }

    /// Deletes a match. Anyone watching it gets a `Removed` event.
    pub async fn remove(&self, id: &MatchId) -> Result<(), MatchError> {
        self.store.remove(&self.collection, id.as_str()).await?;
        Ok(())
    }

    /// Change feed of one match. Starts with its current snapshot.
    pub async fn watch(&self, id: &MatchId) -> Result<MatchFeed, MatchError> {
        let subscription = self
            .store
            .subscribe_to_value(&self.collection, id.as_str())
            .await?;
        Ok(MatchFeed { subscription })
    }

    /// Change feed of the whole collection. Starts with an `Added` for
    /// every existing match.
    pub async fn watch_all(&self) -> Result<MatchFeed, MatchError> {
        let subscription = self.store.subscribe_to_children(&self.collection).await?;
        Ok(MatchFeed { subscription })
    }

    /// Cancels a feed. Nothing more is delivered to it.
    pub async fn unwatch(&self, feed: MatchFeed) -> Result<(), MatchError> {
        self.store.unsubscribe(feed.subscription).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MatchFeed
// ---------------------------------------------------------------------------

/// Decoded change feed of match documents.
#[derive(Debug)]
pub struct MatchFeed {
    subscription: Subscription,
}

impl MatchFeed {
    /// Waits for the next change. Cancel-safe.
    ///
    /// # Errors
    /// - [`MatchError::MalformedDocument`]: the snapshot didn't decode;
    ///   the feed stays usable
    /// - [`MatchError::Store`]: the store failed or the feed closed;
    ///   the feed is over
    pub async fn next(&mut self) -> Result<MatchEvent, MatchError> {
        let StoreEvent { kind, id, document } = self
            .subscription
            .next()
            .await
            .unwrap_or(Err(StoreError::Unavailable))?;

        let snapshot = decode(&id, document)?;
        Ok(MatchEvent { kind, snapshot })
    }
}

// ---------------------------------------------------------------------------
// JSON mapping
// ---------------------------------------------------------------------------

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, MatchError> {
    serde_json::to_value(value).map_err(|e| MatchError::MalformedDocument(e.to_string()))
}

fn encode(m: &Match) -> Result<Value, MatchError> {
    to_json(m)
}

/// Decodes a stored document. The store key is authoritative for the id.
fn decode(id: &str, document: Value) -> Result<Match, MatchError> {
    let mut m: Match = serde_json::from_value(document).map_err(|e| {
        tracing::warn!(match_id = %id, error = %e, "undecodable match document");
        MatchError::MalformedDocument(format!("{id}: {e}"))
    })?;
    m.id = Some(MatchId::new(id));
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_takes_id_from_key() {
        let doc = json!({ "id": "ignored", "challenger": "ana" });
        let m = decode("key-1", doc).unwrap();
        assert_eq!(m.id, Some(MatchId::new("key-1")));
    }

    #[test]
    fn test_decode_rejects_bad_document() {
        let result = decode("key-1", json!({ "moves": [] }));
        assert!(matches!(result, Err(MatchError::MalformedDocument(_))));
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let m = Match {
            id: None,
            challenger: PlayerId::new("ana"),
            opponent: None,
            moves: vec![],
            winner: None,
        };
        assert_eq!(encode(&m).unwrap(), json!({ "challenger": "ana", "moves": [] }));
    }

    #[tokio::test]
    async fn test_record_moves_without_id_fails() {
        let repo = MatchRepository::new(tateti_store::MemoryStore::new(), "matches");
        let unsaved = Match {
            id: None,
            challenger: PlayerId::new("ana"),
            opponent: None,
            moves: vec![],
            winner: None,
        };

        let result = repo.record_moves(&unsaved, None).await;

        assert!(matches!(result, Err(MatchError::MissingMatchId)));
    }
}
