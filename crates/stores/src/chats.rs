//! Chat and message caches.
//!
//! Messages are an append-only log per chat, so a pushed message is added to
//! its chat's list directly instead of waiting for the next query.

use std::sync::Arc;

use taskboard_api::{BackendApi, Chat, Message};
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::reconcile::{EntityCache, ViewKey};
use crate::tracker::OperationTracker;

struct ChatStoreInner {
    api: Arc<dyn BackendApi>,
    message_page_size: u32,
    chats: EntityCache<Chat>,
    messages: EntityCache<Message>,
    tracker: OperationTracker,
}

/// Store for task chats and their messages
#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<ChatStoreInner>,
}

impl ChatStore {
    pub fn new(api: Arc<dyn BackendApi>, message_page_size: u32) -> Self {
        Self {
            inner: Arc::new(ChatStoreInner {
                api,
                message_page_size,
                chats: EntityCache::new(),
                messages: EntityCache::new(),
                tracker: OperationTracker::new(),
            }),
        }
    }

    pub async fn fetch_chats(&self, task_id: &str) -> StoreResult<Vec<Chat>> {
        let chats = self
            .inner
            .tracker
            .query("fetch_chats", self.inner.api.chats_for_task(task_id))
            .await?;
        debug!(task_id, count = chats.len(), "chats fetched");
        self.inner
            .chats
            .replace_view(ViewKey::TaskChats(task_id.to_string()), &chats);
        Ok(chats)
    }

    /// Open the chat between the task owner and `claimer_id`, creating it on
    /// first use, and load its latest messages.
    pub async fn get_or_create_chat(&self, task_id: &str, claimer_id: Option<&str>) -> StoreResult<Chat> {
        let chat = self
            .inner
            .tracker
            .mutation(
                "get_or_create_chat",
                self.inner.api.get_or_create_chat(task_id, claimer_id),
            )
            .await?;
        info!(task_id, chat_id = %chat.id, "chat opened");

        self.inner.chats.upsert(chat.clone());
        if let Err(error) = self.fetch_messages(&chat.id).await {
            warn!(chat_id = %chat.id, %error, "message refresh failed");
        }
        Ok(chat)
    }

    /// Delete a chat for both participants
    pub async fn delete_chat(&self, chat_id: &str) -> StoreResult<()> {
        self.inner
            .tracker
            .mutation("delete_chat", self.inner.api.delete_chat(chat_id))
            .await?;
        info!(chat_id, "chat deleted");

        let removed = self.inner.chats.remove(chat_id);
        self.inner
            .messages
            .remove_view(&ViewKey::ChatMessages(chat_id.to_string()));

        if let Some(chat) = removed {
            if let Err(error) = self.fetch_chats(&chat.task_id).await {
                warn!(task_id = %chat.task_id, %error, "chat list refresh failed");
            }
        }
        Ok(())
    }

    pub async fn send_message(&self, chat_id: &str, content: &str) -> StoreResult<Message> {
        let message = self
            .inner
            .tracker
            .mutation("send_message", self.inner.api.send_message(chat_id, content))
            .await?;
        debug!(chat_id, message_id = %message.id, "message sent");

        self.inner
            .messages
            .append_to_view(ViewKey::ChatMessages(chat_id.to_string()), message.clone());
        if let Err(error) = self.refresh_tail(chat_id).await {
            warn!(chat_id, %error, "message refresh failed");
        }
        Ok(message)
    }

    /// Re-query the page ending at the newest cached message and merge it in.
    /// Earlier messages outside that page stay listed.
    async fn refresh_tail(&self, chat_id: &str) -> StoreResult<()> {
        let key = ViewKey::ChatMessages(chat_id.to_string());
        let page_size = self.inner.message_page_size;
        let listed = u32::try_from(self.inner.messages.view_len(&key)).unwrap_or(u32::MAX);
        let offset = listed.saturating_sub(page_size);

        let messages = self
            .inner
            .tracker
            .query(
                "fetch_messages",
                self.inner.api.messages(chat_id, page_size, offset),
            )
            .await?;
        debug!(chat_id, offset, count = messages.len(), "message tail fetched");
        self.inner.messages.merge_into_view(key, &messages);
        Ok(())
    }

    /// Fetch the first page of messages, oldest first, and make it the chat's
    /// message list
    pub async fn fetch_messages(&self, chat_id: &str) -> StoreResult<Vec<Message>> {
        let messages = self
            .inner
            .tracker
            .query(
                "fetch_messages",
                self.inner
                    .api
                    .messages(chat_id, self.inner.message_page_size, 0),
            )
            .await?;
        debug!(chat_id, count = messages.len(), "messages fetched");
        self.inner
            .messages
            .replace_view(ViewKey::ChatMessages(chat_id.to_string()), &messages);
        Ok(messages)
    }

    pub fn chats_for_task(&self, task_id: &str) -> Vec<Chat> {
        self.inner
            .chats
            .view(&ViewKey::TaskChats(task_id.to_string()))
    }

    pub fn chat(&self, chat_id: &str) -> Option<Chat> {
        self.inner.chats.get(chat_id)
    }

    pub fn messages(&self, chat_id: &str) -> Vec<Message> {
        self.inner
            .messages
            .view(&ViewKey::ChatMessages(chat_id.to_string()))
    }

    /// Insert a pushed message under its chat, whether or not that chat has
    /// been loaded yet.
    pub fn apply_pushed_message(&self, message: Message) {
        debug!(chat_id = %message.chat_id, message_id = %message.id, "applying pushed message");
        self.inner
            .messages
            .append_to_view(ViewKey::ChatMessages(message.chat_id.clone()), message);
    }

    pub fn chat_cache(&self) -> &EntityCache<Chat> {
        &self.inner.chats
    }

    pub fn message_cache(&self) -> &EntityCache<Message> {
        &self.inner.messages
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.inner.tracker
    }
}
