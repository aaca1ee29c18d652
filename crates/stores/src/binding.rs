//! Wiring between the realtime dispatcher and the domain stores.

use std::sync::Arc;

use taskboard_api::BackendApi;
use taskboard_config::ApiConfig;
use taskboard_realtime::{EventCategory, EventDispatcher, HandlerError, RealtimeEvent, SubscriptionHandle};
use tracing::debug;

use crate::chats::ChatStore;
use crate::claims::ClaimStore;
use crate::tasks::TaskStore;

/// The three domain stores, constructed together over one Backend API.
#[derive(Clone)]
pub struct DomainStores {
    pub tasks: TaskStore,
    pub claims: ClaimStore,
    pub chats: ChatStore,
}

impl DomainStores {
    pub fn new(api: Arc<dyn BackendApi>, config: &ApiConfig) -> Self {
        let tasks = TaskStore::new(api.clone(), config.page_size);
        let claims = ClaimStore::new(api.clone(), tasks.clone());
        let chats = ChatStore::new(api, config.message_page_size);
        Self { tasks, claims, chats }
    }

    /// Subscribe each store to the categories it reconciles.
    pub fn bind(&self, dispatcher: &EventDispatcher) -> Vec<SubscriptionHandle> {
        let tasks = self.tasks.clone();
        let task_updates = dispatcher.subscribe(EventCategory::TaskUpdate, move |event| match event {
            RealtimeEvent::TaskUpdate(task) => {
                tasks.apply_task(task.clone());
                Ok(())
            }
            other => Err(unexpected(EventCategory::TaskUpdate, other)),
        });

        let claims = self.claims.clone();
        let claim_updates = dispatcher.subscribe(EventCategory::ClaimUpdate, move |event| match event {
            RealtimeEvent::ClaimUpdate(claim) => {
                claims.apply_claim(claim.clone());
                Ok(())
            }
            other => Err(unexpected(EventCategory::ClaimUpdate, other)),
        });

        let chats = self.chats.clone();
        let chat_messages = dispatcher.subscribe(EventCategory::ChatMessage, move |event| match event {
            RealtimeEvent::ChatMessage(message) => {
                chats.apply_pushed_message(message.clone());
                Ok(())
            }
            other => Err(unexpected(EventCategory::ChatMessage, other)),
        });

        let tasks = self.tasks.clone();
        let escrow_updates = dispatcher.subscribe(EventCategory::EscrowUpdate, move |event| match event {
            RealtimeEvent::EscrowUpdate(escrow) => {
                tasks.apply_escrow(escrow.clone());
                Ok(())
            }
            other => Err(unexpected(EventCategory::EscrowUpdate, other)),
        });

        debug!("domain stores bound to dispatcher");
        vec![task_updates, claim_updates, chat_messages, escrow_updates]
    }

    /// True while any store has an operation in flight.
    pub fn is_loading(&self) -> bool {
        self.tasks.tracker().is_loading()
            || self.claims.tracker().is_loading()
            || self.chats.tracker().is_loading()
    }
}

fn unexpected(expected: EventCategory, event: &RealtimeEvent) -> HandlerError {
    HandlerError::new(format!(
        "{expected} handler received a {} event",
        event.category()
    ))
}
