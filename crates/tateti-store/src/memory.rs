//! In-process [`DocumentStore`]: one Tokio task owns every collection.
//!
//! The store actor receives commands through a bounded mpsc channel and
//! answers through oneshot reply channels. Because a single task applies
//! every write, writes are totally ordered, and each subscriber sees its
//! deliveries in that order.
//!
//! ```text
//! MemoryStore (handle) ──cmd──→ StoreActor ──events──→ Subscription
//! MemoryStore (clone)  ──cmd──↗      │
//!                                    └─ collections: name → (key → object)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::{Map, Value};
use tateti_protocol::EventKind;
use tokio::sync::{mpsc, oneshot};

use crate::{
    DocumentStore, Precondition, StoreError, StoreEvent, Subscription,
    SubscriptionId,
};

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the command channel. When full, callers wait.
    pub channel_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { channel_size: 64 }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<T>;
type EventSender = mpsc::UnboundedSender<Result<StoreEvent, StoreError>>;

enum StoreCommand {
    Create {
        collection: String,
        reply: Reply<String>,
    },
    Set {
        collection: String,
        id: String,
        document: Value,
        reply: Reply<Result<(), StoreError>>,
    },
    Update {
        collection: String,
        id: String,
        fields: Map<String, Value>,
        precondition: Option<Precondition>,
        reply: Reply<Result<(), StoreError>>,
    },
    Get {
        collection: String,
        id: String,
        reply: Reply<Option<Value>>,
    },
    Remove {
        collection: String,
        id: String,
        reply: Reply<()>,
    },
    Subscribe {
        target: Target,
        reply: Reply<Subscription>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: Reply<()>,
    },
    SubscriberCount {
        reply: Reply<usize>,
    },
    Shutdown,
}

/// What a subscriber is watching.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Value { collection: String, id: String },
    Children { collection: String },
}

impl Target {
    fn covers(&self, collection: &str, id: &str) -> bool {
        match self {
            Self::Value {
                collection: c,
                id: i,
            } => c == collection && i == id,
            Self::Children { collection: c } => c == collection,
        }
    }
}

struct Subscriber {
    target: Target,
    sender: EventSender,
}

// ---------------------------------------------------------------------------
// MemoryStore (handle)
// ---------------------------------------------------------------------------

/// Handle to a running in-process store. Cheap to clone; every clone
/// talks to the same actor.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct MemoryStore {
    sender: mpsc::Sender<StoreCommand>,
}

impl MemoryStore {
    /// Spawns the store actor with default settings.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Spawns the store actor.
    pub fn with_config(config: StoreConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_size.max(1));

        let actor = StoreActor {
            collections: HashMap::new(),
            subscribers: HashMap::new(),
            next_subscription: 1,
            receiver: rx,
        };
        tokio::spawn(actor.run());

        Self { sender: tx }
    }

    /// Stops the actor. Every open subscription receives
    /// `Err(StoreError::Unavailable)`; later calls on any handle fail
    /// with the same error.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.sender
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StoreError::Unavailable)
    }

    /// Number of subscriptions the store is still delivering to.
    ///
    /// A subscription that was dropped instead of passed to
    /// [`unsubscribe`](DocumentStore::unsubscribe) counts until the next
    /// write it covers prunes it.
    pub async fn subscriber_count(&self) -> Result<usize, StoreError> {
        self.request(|reply| StoreCommand::SubscriberCount { reply })
            .await
    }

    /// Sends a command built around a fresh reply channel and waits for
    /// the answer.
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| StoreError::Unavailable)?;
        reply_rx.await.map_err(|_| StoreError::Unavailable)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str) -> Result<String, StoreError> {
        self.request(|reply| StoreCommand::Create {
            collection: collection.to_string(),
            reply,
        })
        .await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
            reply,
        })
        .await?
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        precondition: Option<Precondition>,
    ) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            precondition,
            reply,
        })
        .await?
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.request(|reply| StoreCommand::Get {
            collection: collection.to_string(),
            id: id.to_string(),
            reply,
        })
        .await
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::Remove {
            collection: collection.to_string(),
            id: id.to_string(),
            reply,
        })
        .await
    }

    async fn subscribe_to_value(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Subscription, StoreError> {
        self.request(|reply| StoreCommand::Subscribe {
            target: Target::Value {
                collection: collection.to_string(),
                id: id.to_string(),
            },
            reply,
        })
        .await
    }

    async fn subscribe_to_children(
        &self,
        collection: &str,
    ) -> Result<Subscription, StoreError> {
        self.request(|reply| StoreCommand::Subscribe {
            target: Target::Children {
                collection: collection.to_string(),
            },
            reply,
        })
        .await
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), StoreError> {
        let id = subscription.id();
        self.request(|reply| StoreCommand::Unsubscribe { id, reply })
            .await?;
        drop(subscription);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StoreActor
// ---------------------------------------------------------------------------

struct StoreActor {
    /// collection name → (document key → object). `BTreeMap` keeps keys
    /// sorted, and push keys sort by creation time.
    collections: HashMap<String, BTreeMap<String, Value>>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    next_subscription: u64,
    receiver: mpsc::Receiver<StoreCommand>,
}

impl StoreActor {
    async fn run(mut self) {
        tracing::debug!("store actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                StoreCommand::Create { collection, reply } => {
                    let _ = reply.send(self.allocate_key(&collection));
                }
                StoreCommand::Set {
                    collection,
                    id,
                    document,
                    reply,
                } => {
                    let _ = reply.send(self.handle_set(collection, id, document));
                }
                StoreCommand::Update {
                    collection,
                    id,
                    fields,
                    precondition,
                    reply,
                } => {
                    let result =
                        self.handle_update(collection, id, fields, precondition);
                    let _ = reply.send(result);
                }
                StoreCommand::Get {
                    collection,
                    id,
                    reply,
                } => {
                    let doc = self
                        .collections
                        .get(&collection)
                        .and_then(|docs| docs.get(&id))
                        .cloned();
                    let _ = reply.send(doc);
                }
                StoreCommand::Remove {
                    collection,
                    id,
                    reply,
                } => {
                    self.handle_remove(&collection, &id);
                    let _ = reply.send(());
                }
                StoreCommand::Subscribe { target, reply } => {
                    let subscription = self.handle_subscribe(target);
                    let _ = reply.send(subscription);
                }
                StoreCommand::Unsubscribe { id, reply } => {
                    if self.subscribers.remove(&id).is_some() {
                        tracing::debug!(subscription = %id, "unsubscribed");
                    }
                    let _ = reply.send(());
                }
                StoreCommand::SubscriberCount { reply } => {
                    let _ = reply.send(self.subscribers.len());
                }
                StoreCommand::Shutdown => {
                    tracing::info!(
                        subscribers = self.subscribers.len(),
                        "store shutting down"
                    );
                    for (_, subscriber) in self.subscribers.drain() {
                        let _ = subscriber.sender.send(Err(StoreError::Unavailable));
                    }
                    break;
                }
            }
        }

        tracing::debug!("store actor stopped");
    }

    fn allocate_key(&self, collection: &str) -> String {
        let docs = self.collections.get(collection);
        loop {
            let key = push_key();
            if docs.is_none_or(|d| !d.contains_key(&key)) {
                return key;
            }
        }
    }

    fn handle_set(
        &mut self,
        collection: String,
        id: String,
        document: Value,
    ) -> Result<(), StoreError> {
        if !document.is_object() {
            return Err(StoreError::InvalidDocument(format!(
                "{collection}/{id} must be an object"
            )));
        }

        let docs = self.collections.entry(collection.clone()).or_default();
        let existed = docs.insert(id.clone(), document.clone()).is_some();
        let kind = if existed {
            EventKind::Changed
        } else {
            EventKind::Added
        };

        self.notify(&collection, &id, kind, &document);
        Ok(())
    }

    fn handle_update(
        &mut self,
        collection: String,
        id: String,
        fields: Map<String, Value>,
        precondition: Option<Precondition>,
    ) -> Result<(), StoreError> {
        let doc = self
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.clone(),
                id: id.clone(),
            })?;

        if let Some(precondition) = &precondition {
            if !precondition.holds(doc) {
                tracing::debug!(%collection, %id, ?precondition, "precondition failed");
                return Err(StoreError::PreconditionFailed { collection, id });
            }
        }

        let Some(object) = doc.as_object_mut() else {
            return Err(StoreError::InvalidDocument(format!(
                "{collection}/{id} must be an object"
            )));
        };
        for (field, value) in fields {
            if value.is_null() {
                object.remove(&field);
            } else {
                object.insert(field, value);
            }
        }

        let snapshot = doc.clone();
        self.notify(&collection, &id, EventKind::Changed, &snapshot);
        Ok(())
    }

    fn handle_remove(&mut self, collection: &str, id: &str) {
        let removed = self
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));

        if let Some(document) = removed {
            self.notify(collection, id, EventKind::Removed, &document);
        }
    }

    fn handle_subscribe(&mut self, target: Target) -> Subscription {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let (tx, rx) = mpsc::unbounded_channel();

        // Initial deliveries go out before the subscriber is registered,
        // so they always precede live events.
        match &target {
            Target::Value {
                collection,
                id: doc_id,
            } => {
                if let Some(doc) = self
                    .collections
                    .get(collection)
                    .and_then(|docs| docs.get(doc_id))
                {
                    let _ = tx.send(Ok(StoreEvent {
                        kind: EventKind::Changed,
                        id: doc_id.clone(),
                        document: doc.clone(),
                    }));
                }
            }
            Target::Children { collection } => {
                for (doc_id, doc) in self.collections.get(collection).into_iter().flatten() {
                    let _ = tx.send(Ok(StoreEvent {
                        kind: EventKind::Added,
                        id: doc_id.clone(),
                        document: doc.clone(),
                    }));
                }
            }
        }

        tracing::debug!(subscription = %id, ?target, "subscribed");
        self.subscribers.insert(
            id,
            Subscriber {
                target,
                sender: tx,
            },
        );

        Subscription::new(id, rx)
    }

    /// Delivers a change to every matching subscriber. Value feeds never
    /// see `Added`; for them a new document is just a changed value.
    /// Subscribers whose receiver is gone are pruned.
    fn notify(&mut self, collection: &str, id: &str, kind: EventKind, document: &Value) {
        let mut gone = Vec::new();

        for (sub_id, subscriber) in &self.subscribers {
            if !subscriber.target.covers(collection, id) {
                continue;
            }
            let kind = match (&subscriber.target, kind) {
                (Target::Value { .. }, EventKind::Added) => EventKind::Changed,
                (_, kind) => kind,
            };
            let event = StoreEvent {
                kind,
                id: id.to_string(),
                document: document.clone(),
            };
            if subscriber.sender.send(Ok(event)).is_err() {
                gone.push(*sub_id);
            }
        }

        for sub_id in gone {
            self.subscribers.remove(&sub_id);
            tracing::warn!(subscription = %sub_id, "subscriber dropped without unsubscribing, pruned");
        }
    }
}

// ---------------------------------------------------------------------------
// Push keys
// ---------------------------------------------------------------------------

/// Key alphabet, in ASCII order so keys sort lexicographically.
const PUSH_CHARS: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Generates a 20-character, time-ordered key: 8 characters of
/// milliseconds since the epoch followed by 12 random characters.
fn push_key() -> String {
    let mut now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut key = [0u8; 20];
    for slot in key[..8].iter_mut().rev() {
        *slot = PUSH_CHARS[(now % 64) as usize];
        now /= 64;
    }

    let mut rng = rand::rng();
    for slot in &mut key[8..] {
        *slot = PUSH_CHARS[rng.random_range(0..64)];
    }

    key.iter().map(|&b| b as char).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_key_shape() {
        let key = push_key();
        assert_eq!(key.len(), 20);
        assert!(key.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn test_push_keys_are_unique() {
        let a = push_key();
        let b = push_key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_push_chars_are_sorted() {
        assert!(PUSH_CHARS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_target_covers() {
        let value = Target::Value {
            collection: "matches".into(),
            id: "a".into(),
        };
        let children = Target::Children {
            collection: "matches".into(),
        };

        assert!(value.covers("matches", "a"));
        assert!(!value.covers("matches", "b"));
        assert!(children.covers("matches", "b"));
        assert!(!children.covers("players", "a"));
    }

    #[tokio::test]
    async fn test_set_then_get_returns_document() {
        let store = MemoryStore::new();
        store.set("c", "k", json!({ "a": 1 })).await.unwrap();

        let doc = store.get("c", "k").await.unwrap();
        assert_eq!(doc, Some(json!({ "a": 1 })));
    }

    #[tokio::test]
    async fn test_set_non_object_returns_invalid_document() {
        let store = MemoryStore::new();
        let result = store.set("c", "k", json!([1, 2])).await;
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_update_missing_document_returns_not_found() {
        let store = MemoryStore::new();
        let result = store.update("c", "nope", Map::new(), None).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_null_removes_field() {
        let store = MemoryStore::new();
        store.set("c", "k", json!({ "a": 1, "b": 2 })).await.unwrap();

        let mut fields = Map::new();
        fields.insert("a".into(), Value::Null);
        fields.insert("c".into(), json!(3));
        store.update("c", "k", fields, None).await.unwrap();

        let doc = store.get("c", "k").await.unwrap();
        assert_eq!(doc, Some(json!({ "b": 2, "c": 3 })));
    }

    #[tokio::test]
    async fn test_update_failed_precondition_leaves_document() {
        let store = MemoryStore::new();
        store.set("c", "k", json!({ "moves": [1] })).await.unwrap();

        let mut fields = Map::new();
        fields.insert("moves".into(), json!([1, 2]));
        let result = store
            .update(
                "c",
                "k",
                fields,
                Some(Precondition::FieldLength {
                    field: "moves".into(),
                    len: 0,
                }),
            )
            .await;

        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
        assert_eq!(store.get("c", "k").await.unwrap(), Some(json!({ "moves": [1] })));
    }

    #[tokio::test]
    async fn test_create_returns_distinct_keys() {
        let store = MemoryStore::new();
        let a = store.create("c").await.unwrap();
        let b = store.create("c").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_unsubscribe_and_pruning() {
        let store = MemoryStore::new();
        let kept = store.subscribe_to_value("c", "k").await.unwrap();
        let dropped = store.subscribe_to_children("c").await.unwrap();
        assert_eq!(store.subscriber_count().await.unwrap(), 2);

        store.unsubscribe(kept).await.unwrap();
        assert_eq!(store.subscriber_count().await.unwrap(), 1);

        drop(dropped);
        assert_eq!(store.subscriber_count().await.unwrap(), 1);
        store.set("c", "k", json!({ "a": 1 })).await.unwrap();
        assert_eq!(store.subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_return_unavailable() {
        let store = MemoryStore::new();
        store.shutdown().await.unwrap();

        tokio::task::yield_now().await;
        let result = store.get("c", "k").await;
        assert_eq!(result, Err(StoreError::Unavailable));
    }
}
