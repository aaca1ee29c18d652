use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

/// Movement of a task's reward in or out of escrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub amount: f64,
    pub transaction_type: EscrowTransactionType,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowTransactionType {
    Lock,
    Release,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Pending,
    Completed,
    Failed,
}

impl Entity for EscrowTransaction {
    fn id(&self) -> &str {
        &self.id
    }
}
