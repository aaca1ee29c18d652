//! # Taskboard API Crate
//!
//! Client-side view of the Backend API: the entity snapshots it returns, the
//! HTTP client that talks to it, and the per-device identity that
//! authenticates every call.
//!
//! ## Architecture
//!
//! - **Entities**: Snapshots (Task, Claim, Chat, Message, EscrowTransaction)
//! - **Client**: `BackendApi` trait and its reqwest implementation
//! - **Identity**: Persisted device identifier
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskboard_api::{ApiClient, BackendApi, DeviceIdentity};
//! use taskboard_config::ApiConfig;
//!
//! # async fn run() -> Result<(), taskboard_api::ApiError> {
//! let identity = DeviceIdentity::load_or_create("device_id")?;
//! let client = ApiClient::new(&ApiConfig::default(), identity)?;
//! let tasks = client.open_tasks(20, 0).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod entities;
pub mod error;
pub mod identity;

pub use client::{ApiClient, BackendApi, DEVICE_ID_HEADER};
pub use entities::{
    Chat, Claim, ClaimStatus, CreateTaskRequest, Entity, EscrowStatus, EscrowTransaction,
    EscrowTransactionType, Message, SubmitCompletionRequest, Task, TaskStatus,
};
pub use error::{ApiError, ApiResult};
pub use identity::DeviceIdentity;
