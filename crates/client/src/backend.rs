//! Seams between the client logic and the Redeemdesk service

use async_trait::async_trait;
use futures::stream::BoxStream;
use redeemdesk_shared::{ChatMessage, Conversation, MessageBody, QueueItem, SenderRole, ServerEvent};
use uuid::Uuid;

use crate::error::ClientResult;

/// Message about to be appended on behalf of the customer (or the scripted bot)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Raw customer identifier; the service normalizes it
    pub customer_id: String,
    pub sender_role: SenderRole,
    pub sender_id: Option<String>,
    pub body: MessageBody,
}

/// Stream of realtime events for one conversation
pub type PushStream = BoxStream<'static, ClientResult<ServerEvent>>;

/// Request/response operations against the service
#[async_trait]
pub trait DeskBackend: Send + Sync {
    /// Find the customer's active conversation or create it
    async fn open_conversation(
        &self,
        customer_id: &str,
        customer_name: &str,
    ) -> ClientResult<Conversation>;

    /// All messages of a conversation, oldest first
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        customer_id: &str,
    ) -> ClientResult<Vec<ChatMessage>>;

    async fn send_message(
        &self,
        conversation_id: Uuid,
        message: &OutgoingMessage,
    ) -> ClientResult<ChatMessage>;

    /// Mark admin and bot messages read; returns the ids that changed
    async fn mark_read(&self, conversation_id: Uuid, customer_id: &str) -> ClientResult<Vec<Uuid>>;

    /// Upload an image and return its public URL
    async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<String>;

    /// Queue items matching the query on any searchable field
    async fn lookup_queue(&self, query: &str) -> ClientResult<Vec<QueueItem>>;
}

/// Push subscription capability keyed by conversation
#[async_trait]
pub trait PushSource: Send + Sync {
    /// Subscribe to one conversation; resolves once the subscription is confirmed
    async fn subscribe(&self, conversation_id: Uuid) -> ClientResult<PushStream>;
}
