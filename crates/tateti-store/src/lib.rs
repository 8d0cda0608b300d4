//! Shared document store for Tateti.
//!
//! Two players' clients never talk to each other; they both read and
//! write the same match document and react to its change feed. This
//! crate defines that collaborator:
//!
//! - [`DocumentStore`]: the trait (create / set / update / get /
//!   remove / subscribe / unsubscribe)
//! - [`Subscription`] and [`StoreEvent`]: change feeds
//! - [`Precondition`]: optional guard for partial writes
//! - [`MemoryStore`]: an in-process implementation run as an actor
//!
//! # How it fits in the stack
//!
//! ```text
//! Match layer (above)  ← maps Match documents onto collections
//!     ↕
//! Store layer (this crate)  ← JSON documents + change feeds
//! ```

mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::{MemoryStore, StoreConfig};
pub use store::{DocumentStore, Precondition, StoreEvent, Subscription, SubscriptionId};
