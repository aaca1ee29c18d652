use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

/// Private conversation between a task owner and one claimer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub task_id: String,
    pub participant_id: String,
    pub other_participant_id: String,
    pub deleted_by_participant: bool,
    pub deleted_by_other: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Either side deleting the chat hides it for both.
    pub fn is_deleted(&self) -> bool {
        self.deleted_by_participant || self.deleted_by_other
    }
}

impl Entity for Chat {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Message {
    fn id(&self) -> &str {
        &self.id
    }
}
