//! # Taskboard Stores Crate
//!
//! Client-side caches of server-authoritative state.
//!
//! - **Reconcile**: identity-keyed replace, last write wins, list views by id
//! - **Tracker**: per-store in-flight count and last error
//! - **Tasks / Claims / Chats**: query and mutation operations; every
//!   successful mutation re-queries the cache slices it affects
//! - **Binding**: subscribes the stores to pushed realtime events

pub mod binding;
pub mod chats;
pub mod claims;
pub mod error;
pub mod reconcile;
pub mod tasks;
pub mod tracker;

pub use binding::DomainStores;
pub use chats::ChatStore;
pub use claims::ClaimStore;
pub use error::{StoreError, StoreResult};
pub use reconcile::{EntityCache, ViewKey};
pub use tasks::TaskStore;
pub use tracker::{OperationFailure, OperationGuard, OperationTracker};
