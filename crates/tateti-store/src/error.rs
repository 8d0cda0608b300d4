//! Error types for the store layer.

/// Errors a [`DocumentStore`](crate::DocumentStore) can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store can't be reached: its task stopped, the channel is
    /// closed, or it shut down while a subscription was open.
    #[error("document store is unavailable")]
    Unavailable,

    /// A partial write or removal targeted a document that doesn't exist.
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// The document no longer satisfies the write's precondition.
    /// Someone else wrote first.
    #[error("precondition failed on {collection}/{id}")]
    PreconditionFailed { collection: String, id: String },

    /// Documents must be JSON objects.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
