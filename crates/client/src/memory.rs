//! In-process backend for tests and demos
//!
//! Mirrors the service's rules (normalized customer ids, one active
//! conversation, staff-side read receipts) and exposes hooks to inject
//! failures and out-of-band events.

use async_trait::async_trait;
use futures::StreamExt;
use redeemdesk_shared::{
    validate_customer_id, ChatMessage, Conversation, ConversationStatus, MessageBody, QueueItem,
    SenderRole, ServerEvent,
};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    backend::{DeskBackend, OutgoingMessage, PushSource, PushStream},
    error::{ClientError, ClientResult},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    conversations: Vec<Conversation>,
    messages: Vec<ChatMessage>,
    queue: Vec<QueueItem>,
    fail_sends: usize,
    fail_subscribes: usize,
    subscribe_attempts: Vec<Instant>,
}

pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ServerEvent>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    pub fn with_queue(items: Vec<QueueItem>) -> Self {
        let backend = Self::new();
        backend.lock().queue = items;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: ServerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Fail the next `n` message sends with a timeout
    pub fn fail_next_sends(&self, n: usize) {
        self.lock().fail_sends = n;
    }

    /// Fail the next `n` subscription attempts with a timeout
    pub fn fail_next_subscribes(&self, n: usize) {
        self.lock().fail_subscribes = n;
    }

    /// When each subscription attempt happened
    pub fn subscribe_attempts(&self) -> Vec<Instant> {
        self.lock().subscribe_attempts.clone()
    }

    /// Broadcast an event without touching stored state
    pub fn push_event(&self, event: ServerEvent) {
        self.publish(event);
    }

    /// Store a message without broadcasting it, as if the push was lost
    pub fn insert_silently(
        &self,
        conversation_id: Uuid,
        sender_role: SenderRole,
        text: &str,
    ) -> ChatMessage {
        let message = new_message(conversation_id, sender_role, "memory", MessageBody::Text(text.into()));
        self.lock().messages.push(message.clone());
        message
    }

    /// Store and broadcast an admin reply
    pub fn admin_reply(&self, conversation_id: Uuid, text: &str) -> ChatMessage {
        let message = new_message(conversation_id, SenderRole::Admin, "admin", MessageBody::Text(text.into()));
        self.lock().messages.push(message.clone());
        self.publish(ServerEvent::NewMessage {
            conversation_id,
            message: message.clone(),
        });
        message
    }

    /// Close a conversation and broadcast the status change
    pub fn close_conversation(&self, conversation_id: Uuid) -> bool {
        let closed = {
            let mut inner = self.lock();
            match inner
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id && c.is_active())
            {
                Some(conversation) => {
                    let now = OffsetDateTime::now_utc();
                    conversation.status = ConversationStatus::Closed;
                    conversation.closed_at = Some(now);
                    conversation.updated_at = now;
                    true
                }
                None => false,
            }
        };

        if closed {
            self.publish(ServerEvent::ConversationUpdated {
                conversation_id,
                status: ConversationStatus::Closed,
            });
        }
        closed
    }

    /// Stored messages of a conversation
    pub fn stored_messages(&self, conversation_id: Uuid) -> Vec<ChatMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn conversation_count(&self) -> usize {
        self.lock().conversations.len()
    }

    fn owned_conversation(
        inner: &Inner,
        conversation_id: Uuid,
        customer_id: &str,
    ) -> ClientResult<Conversation> {
        let customer_id = validate_customer_id(customer_id)?;
        inner
            .conversations
            .iter()
            .find(|c| c.id == conversation_id && c.customer_id == customer_id)
            .cloned()
            .ok_or(ClientError::NotFound)
    }
}

fn new_message(
    conversation_id: Uuid,
    sender_role: SenderRole,
    sender_id: &str,
    body: MessageBody,
) -> ChatMessage {
    let (content, image_url) = body.into_columns();
    ChatMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender_role,
        sender_id: sender_id.to_string(),
        content,
        image_url,
        is_read: false,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[async_trait]
impl DeskBackend for InMemoryBackend {
    async fn open_conversation(
        &self,
        customer_id: &str,
        customer_name: &str,
    ) -> ClientResult<Conversation> {
        let customer_id = validate_customer_id(customer_id)?;
        let mut inner = self.lock();

        if let Some(existing) = inner
            .conversations
            .iter()
            .filter(|c| c.customer_id == customer_id && c.is_active())
            .max_by_key(|c| c.created_at)
        {
            return Ok(existing.clone());
        }

        let now = OffsetDateTime::now_utc();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            customer_id,
            customer_name: customer_name.trim().to_string(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        inner.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        customer_id: &str,
    ) -> ClientResult<Vec<ChatMessage>> {
        let inner = self.lock();
        Self::owned_conversation(&inner, conversation_id, customer_id)?;

        let mut messages: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(messages)
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        message: &OutgoingMessage,
    ) -> ClientResult<ChatMessage> {
        let stored = {
            let mut inner = self.lock();
            if inner.fail_sends > 0 {
                inner.fail_sends -= 1;
                return Err(ClientError::Timeout);
            }

            let conversation =
                Self::owned_conversation(&inner, conversation_id, &message.customer_id)?;
            if !conversation.is_active() {
                return Err(ClientError::ConversationClosed);
            }
            if message.sender_role == SenderRole::Admin {
                return Err(ClientError::Validation("admin messages are not accepted here".into()));
            }

            let sender_id = message
                .sender_id
                .clone()
                .unwrap_or_else(|| conversation.customer_id.clone());
            let stored = new_message(
                conversation_id,
                message.sender_role,
                &sender_id,
                message.body.clone(),
            );
            inner.messages.push(stored.clone());
            stored
        };

        self.publish(ServerEvent::NewMessage {
            conversation_id,
            message: stored.clone(),
        });
        Ok(stored)
    }

    async fn mark_read(&self, conversation_id: Uuid, customer_id: &str) -> ClientResult<Vec<Uuid>> {
        let message_ids: Vec<Uuid> = {
            let mut inner = self.lock();
            Self::owned_conversation(&inner, conversation_id, customer_id)?;

            inner
                .messages
                .iter_mut()
                .filter(|m| {
                    m.conversation_id == conversation_id && m.sender_role.is_staff_side() && !m.is_read
                })
                .map(|m| {
                    m.is_read = true;
                    m.id
                })
                .collect()
        };

        if !message_ids.is_empty() {
            self.publish(ServerEvent::MessagesRead {
                conversation_id,
                reader: SenderRole::Customer,
                message_ids: message_ids.clone(),
            });
        }
        Ok(message_ids)
    }

    async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<String> {
        if !content_type.starts_with("image/") {
            return Err(ClientError::Validation("only images can be uploaded".into()));
        }
        if bytes.is_empty() {
            return Err(ClientError::Validation("uploaded file is empty".into()));
        }
        Ok(format!("https://media.invalid/{}/{}", Uuid::new_v4().simple(), file_name))
    }

    async fn lookup_queue(&self, query: &str) -> ClientResult<Vec<QueueItem>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::Validation("query is required".into()));
        }

        let mut items: Vec<QueueItem> = self
            .lock()
            .queue
            .iter()
            .filter(|item| item.matches_query(query))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.queue_number);
        Ok(items)
    }
}

#[async_trait]
impl PushSource for InMemoryBackend {
    async fn subscribe(&self, conversation_id: Uuid) -> ClientResult<PushStream> {
        {
            let mut inner = self.lock();
            inner.subscribe_attempts.push(Instant::now());
            if inner.fail_subscribes > 0 {
                inner.fail_subscribes -= 1;
                return Err(ClientError::Timeout);
            }
        }

        let rx = self.events.subscribe();
        let stream = futures::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.conversation_id() == Some(conversation_id) => {
                        return Some((Ok(event), rx));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "In-memory push receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_conversation_normalizes_customer() {
        let backend = InMemoryBackend::new();

        let first = backend.open_conversation("Player One", "Player One").await.unwrap();
        let second = backend.open_conversation("  PLAYERone", "someone").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.customer_id, "playerone");
        assert_eq!(backend.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_conversation_starts_new_one() {
        let backend = InMemoryBackend::new();
        let first = backend.open_conversation("player", "P").await.unwrap();
        assert!(backend.close_conversation(first.id));

        let second = backend.open_conversation("player", "P").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let backend = InMemoryBackend::new();
        let conversation = backend.open_conversation("alice", "Alice").await.unwrap();

        assert!(matches!(
            backend.list_messages(conversation.id, "mallory").await,
            Err(ClientError::NotFound)
        ));
    }
}
