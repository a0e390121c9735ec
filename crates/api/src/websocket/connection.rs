//! WebSocket connection management
//!
//! Represents an active WebSocket connection with subscription tracking.

use redeemdesk_shared::ServerEvent;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Who is on the other end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Anonymous customer identified by normalized customer id
    Customer(String),
    /// Dashboard admin
    Admin,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin)
    }
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Authenticated principal
    pub principal: Principal,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Set of conversation IDs this connection is subscribed to
    pub subscriptions: Arc<RwLock<HashSet<Uuid>>>,
}

impl Connection {
    /// Create a new connection
    pub fn new(principal: Principal, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            principal,
            sender,
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Err if the connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    pub async fn subscribe(&self, conversation_id: Uuid) {
        let mut subs = self.subscriptions.write().await;
        subs.insert(conversation_id);
        tracing::debug!(
            session_id = %self.session_id,
            conversation_id = %conversation_id,
            "Subscribed to conversation"
        );
    }

    pub async fn unsubscribe(&self, conversation_id: Uuid) {
        let mut subs = self.subscriptions.write().await;
        subs.remove(&conversation_id);
        tracing::debug!(
            session_id = %self.session_id,
            conversation_id = %conversation_id,
            "Unsubscribed from conversation"
        );
    }

    pub async fn is_subscribed(&self, conversation_id: &Uuid) -> bool {
        let subs = self.subscriptions.read().await;
        subs.contains(conversation_id)
    }
}
