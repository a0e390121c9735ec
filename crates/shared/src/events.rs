//! Realtime event types exchanged over the chat WebSocket
//!
//! Both sides serialize with a `type` tag in snake_case, e.g.
//! `{"type":"subscribe","conversation_id":"..."}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChatMessage, ConversationStatus, SenderRole};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe to a conversation's changes
    Subscribe { conversation_id: Uuid },

    /// Unsubscribe from a conversation
    Unsubscribe { conversation_id: Uuid },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { session_id: Uuid },

    /// Subscription accepted
    Subscribed { conversation_id: Uuid },

    /// New message appended to a conversation
    NewMessage {
        conversation_id: Uuid,
        message: ChatMessage,
    },

    /// Messages were marked read by the given side
    MessagesRead {
        conversation_id: Uuid,
        reader: SenderRole,
        message_ids: Vec<Uuid>,
    },

    /// Conversation lifecycle changed
    ConversationUpdated {
        conversation_id: Uuid,
        status: ConversationStatus,
    },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

impl ServerEvent {
    /// Conversation this event belongs to, if any
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::Subscribed { conversation_id }
            | ServerEvent::NewMessage { conversation_id, .. }
            | ServerEvent::MessagesRead { conversation_id, .. }
            | ServerEvent::ConversationUpdated { conversation_id, .. } => Some(*conversation_id),
            ServerEvent::Connected { .. } | ServerEvent::Pong | ServerEvent::Error { .. } => None,
        }
    }
}
