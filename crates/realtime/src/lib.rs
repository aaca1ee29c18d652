//! # Taskboard Realtime Crate
//!
//! Persistent socket to the backend plus the fan-out of pushed events to
//! whoever subscribed to them.
//!
//! - **Events**: closed set of categories and the typed `RealtimeEvent` sum type
//! - **Dispatcher**: decodes frames and invokes subscribers in registration order
//! - **Connection**: socket lifecycle, device-id handshake, linear-backoff reconnects

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;

pub use connection::{socket_endpoint, ConnectionManager, ConnectionState, ReconnectPolicy};
pub use dispatcher::{EventDispatcher, EventHandler, SubscriptionHandle};
pub use error::{ConnectionError, FrameDecodeError, HandlerError};
pub use events::{decode_frame, EventCategory, LifecycleEvent, RealtimeEvent};
