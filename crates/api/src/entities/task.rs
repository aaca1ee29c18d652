use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

/// A unit of paid work posted by its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub reward_amount: f64,
    pub max_claimants: u32,
    /// Claims are refused after this instant
    pub claim_deadline: DateTime<Utc>,
    /// Owner must approve or reject submissions before this instant
    pub owner_deadline: DateTime<Utc>,
    pub status: TaskStatus,
    pub escrow_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Claimed,
    Completed,
    Cancelled,
    Disputed,
}

impl Task {
    /// Mirrors the backend's claimability rule so callers can grey out
    /// actions without a round trip. The backend still decides.
    pub fn can_be_claimed(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Open && now < self.claim_deadline && !self.escrow_locked
    }
}

impl Entity for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Request body for `POST /tasks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub reward_amount: f64,
    pub max_claimants: u32,
    pub claim_deadline: DateTime<Utc>,
    pub owner_deadline: DateTime<Utc>,
}
