//! Event types pushed over the realtime channel.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use taskboard_api::{Claim, EscrowTransaction, Message, Task};

use crate::error::FrameDecodeError;

/// Closed set of subscription categories.
///
/// The four data categories map one-to-one onto the wire `type` tag;
/// `Lifecycle` is reserved for connection state transitions and never
/// arrives from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    TaskUpdate,
    ChatMessage,
    ClaimUpdate,
    EscrowUpdate,
    Lifecycle,
}

impl EventCategory {
    pub const DATA: [EventCategory; 4] = [
        EventCategory::TaskUpdate,
        EventCategory::ChatMessage,
        EventCategory::ClaimUpdate,
        EventCategory::EscrowUpdate,
    ];

    /// Parse a wire tag. `None` for tags this client does not know.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "task_update" => Some(Self::TaskUpdate),
            "chat_message" => Some(Self::ChatMessage),
            "claim_update" => Some(Self::ClaimUpdate),
            "escrow_update" => Some(Self::EscrowUpdate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskUpdate => "task_update",
            Self::ChatMessage => "chat_message",
            Self::ClaimUpdate => "claim_update",
            Self::EscrowUpdate => "escrow_update",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state transitions, delivered to `Lifecycle` subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    Disconnected,
    /// Reconnect attempts are exhausted; nothing further is scheduled.
    ConnectionLost { attempts: u32 },
}

/// A decoded event, one variant per category with its concrete payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    TaskUpdate(Task),
    ChatMessage(Message),
    ClaimUpdate(Claim),
    EscrowUpdate(EscrowTransaction),
    Lifecycle(LifecycleEvent),
}

impl RealtimeEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::TaskUpdate(_) => EventCategory::TaskUpdate,
            Self::ChatMessage(_) => EventCategory::ChatMessage,
            Self::ClaimUpdate(_) => EventCategory::ClaimUpdate,
            Self::EscrowUpdate(_) => EventCategory::EscrowUpdate,
            Self::Lifecycle(_) => EventCategory::Lifecycle,
        }
    }

    /// Identifier of the entity carried by a data event.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::TaskUpdate(task) => Some(&task.id),
            Self::ChatMessage(message) => Some(&message.id),
            Self::ClaimUpdate(claim) => Some(&claim.id),
            Self::EscrowUpdate(escrow) => Some(&escrow.id),
            Self::Lifecycle(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    payload: Value,
}

/// Decode one inbound text frame.
///
/// Returns `Ok(None)` for a well-formed envelope whose `type` is not one of
/// the known categories; such frames are dropped without complaint.
pub fn decode_frame(frame: &str) -> Result<Option<RealtimeEvent>, FrameDecodeError> {
    let envelope: Envelope = serde_json::from_str(frame).map_err(FrameDecodeError::Envelope)?;

    let Some(category) = EventCategory::from_wire(&envelope.kind) else {
        return Ok(None);
    };

    let payload_error = |source| FrameDecodeError::Payload { category, source };
    let event = match category {
        EventCategory::TaskUpdate => {
            RealtimeEvent::TaskUpdate(serde_json::from_value(envelope.payload).map_err(payload_error)?)
        }
        EventCategory::ChatMessage => {
            RealtimeEvent::ChatMessage(serde_json::from_value(envelope.payload).map_err(payload_error)?)
        }
        EventCategory::ClaimUpdate => {
            RealtimeEvent::ClaimUpdate(serde_json::from_value(envelope.payload).map_err(payload_error)?)
        }
        EventCategory::EscrowUpdate => RealtimeEvent::EscrowUpdate(
            serde_json::from_value(envelope.payload).map_err(payload_error)?,
        ),
        EventCategory::Lifecycle => return Ok(None),
    };

    Ok(Some(event))
}
