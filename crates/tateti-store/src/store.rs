//! The [`DocumentStore`] trait and the values that flow through it.
//!
//! The store is a realtime document database in miniature: named
//! collections of JSON objects, each object under a string key, plus
//! change feeds on a single document or a whole collection.
//!
//! ```text
//! collection "matches"
//! ├── -NvT3k9xAbCdEfGhIjKl  { "challenger": "ana", "moves": [...] }
//! └── -NvT3kA0MnOpQrStUvWx  { "challenger": "beto", ... }
//! ```
//!
//! Nothing here knows about tateti; the match crate maps its types onto
//! these documents.

use std::fmt;
use std::future::Future;

use serde_json::{Map, Value};
use tateti_protocol::EventKind;
use tokio::sync::mpsc;

use crate::StoreError;

// ---------------------------------------------------------------------------
// StoreEvent / Subscription
// ---------------------------------------------------------------------------

/// One delivery from a change feed.
///
/// `document` is always the full object after the change (or the last
/// known object for `Removed`), never a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    pub kind: EventKind,
    pub id: String,
    pub document: Value,
}

/// Identifies a subscription inside the store that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live change feed.
///
/// All deliveries for one subscription go through a single ordered
/// channel, so events arrive in the order the store applied the writes.
/// A closed channel (`None` from [`next`](Self::next)) or an
/// `Err(StoreError::Unavailable)` both mean the feed is over.
///
/// Dropping a `Subscription` stops delivery lazily (the store notices on
/// its next send). Pass it to [`DocumentStore::unsubscribe`] to stop it
/// right away.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<Result<StoreEvent, StoreError>>,
}

impl Subscription {
    /// Wraps the receiving half of a feed. Store implementations call
    /// this; consumers only receive ready-made subscriptions.
    pub fn new(
        id: SubscriptionId,
        receiver: mpsc::UnboundedReceiver<Result<StoreEvent, StoreError>>,
    ) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next delivery. Cancel-safe.
    pub async fn next(&mut self) -> Option<Result<StoreEvent, StoreError>> {
        self.receiver.recv().await
    }
}

// ---------------------------------------------------------------------------
// Precondition
// ---------------------------------------------------------------------------

/// A condition the stored document must meet for a partial write to be
/// applied. Checked atomically with the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `field` must be an array of exactly `len` elements. An absent
    /// field counts as an empty array.
    FieldLength { field: String, len: usize },

    /// `field` must be absent (or `null`).
    FieldAbsent { field: String },
}

impl Precondition {
    /// Returns `true` if `document` satisfies the condition.
    pub fn holds(&self, document: &Value) -> bool {
        match self {
            Self::FieldLength { field, len } => match document.get(field) {
                None | Some(Value::Null) => *len == 0,
                Some(Value::Array(items)) => items.len() == *len,
                Some(_) => false,
            },
            Self::FieldAbsent { field } => {
                matches!(document.get(field), None | Some(Value::Null))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// A shared, eventually consistent document store with change feeds.
///
/// Implementations are cheap handles (`Clone`) to some shared backend;
/// every clone talks to the same data. Writes without a precondition are
/// last-write-wins.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` so one handle can be cloned into every
/// connection task of the server.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Allocates a fresh key in `collection`. Nothing is written; the
    /// key is only guaranteed not to be in use right now.
    fn create(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Writes the whole document, replacing any previous one.
    ///
    /// # Errors
    /// [`StoreError::InvalidDocument`] if `document` isn't an object.
    fn set(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Merges `fields` into the top level of an existing document. A
    /// `null` value removes that field.
    ///
    /// # Errors
    /// - [`StoreError::NotFound`] if the document doesn't exist
    /// - [`StoreError::PreconditionFailed`] if `precondition` doesn't hold
    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        precondition: Option<Precondition>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Point read.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Deletes a document. Removing a missing document is a no-op.
    fn remove(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Feed of one document. The current snapshot (if any) is delivered
    /// first as `Changed`, then every later write.
    fn subscribe_to_value(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Feed of a whole collection. Existing documents are delivered
    /// first as `Added`, then `Added`/`Changed`/`Removed` as they happen.
    fn subscribe_to_children(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Cancels a feed. No delivery happens after this returns.
    fn unsubscribe(
        &self,
        subscription: Subscription,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
