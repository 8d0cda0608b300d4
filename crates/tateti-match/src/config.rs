//! Engine configuration.

use serde::{Deserialize, Serialize};

/// How concurrent writers to the same match are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concurrency {
    /// Turn checks run against the local snapshot only; if two writes
    /// race, the store keeps the last one.
    #[default]
    LastWriteWins,

    /// Writes carry store preconditions: `moves` must still have the
    /// length this client saw, and `opponent` must still be absent when
    /// joining. The losing writer gets `StaleMatch` or
    /// `OpponentSlotTaken`.
    Optimistic,
}

/// Settings shared by every match session of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Store collection that holds match documents.
    pub collection: String,

    pub concurrency: Concurrency,
}

impl EngineConfig {
    pub const DEFAULT_COLLECTION: &'static str = "matches";

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn is_optimistic(&self) -> bool {
        self.concurrency == Concurrency::Optimistic
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection: Self::DEFAULT_COLLECTION.to_string(),
            concurrency: Concurrency::default(),
        }
    }
}
