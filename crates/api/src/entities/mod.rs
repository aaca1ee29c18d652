//! Entity snapshots returned by the Backend API.
//!
//! These are plain data objects. The backend is the sole source of truth for
//! their contents; the client only caches the latest snapshot it has seen.

pub mod chat;
pub mod claim;
pub mod escrow;
pub mod task;

pub use chat::{Chat, Message};
pub use claim::{Claim, ClaimStatus, SubmitCompletionRequest};
pub use escrow::{EscrowStatus, EscrowTransaction, EscrowTransactionType};
pub use task::{CreateTaskRequest, Task, TaskStatus};

/// Anything the client caches by identifier.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}
