//! Error types for the realtime channel.
//!
//! None of these ever reach code that did not ask for them: decode and handler
//! failures are reported and swallowed by the dispatcher, and transport
//! failures on the background path end in a lifecycle event.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::events::EventCategory;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot derive socket endpoint from {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("device id is not a valid handshake header value")]
    InvalidCredential,

    #[error("socket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    #[error("socket handshake did not complete within {after:?}")]
    Timeout { after: Duration },

    #[error("connection attempt aborted by disconnect")]
    Aborted,
}

impl ConnectionError {
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame is not a {{type, payload}} envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("invalid {category} payload: {source}")]
    Payload {
        category: EventCategory,
        #[source]
        source: serde_json::Error,
    },

    #[error("binary frames are not supported ({len} bytes)")]
    Binary { len: usize },
}

/// Failure reported by a subscriber. Logged by the dispatcher, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
