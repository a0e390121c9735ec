//! Domain types shared by the Redeemdesk service and client

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::text::contains_case_insensitive;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a customer conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
}

impl Default for ConversationStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Customer,
    Admin,
    Bot,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::Bot => "bot",
        }
    }

    /// Whether a message from this role is shown on the customer's side of the thread
    pub fn is_staff_side(&self) -> bool {
        matches!(self, Self::Admin | Self::Bot)
    }
}

/// Status of a redemption request in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Waiting,
    Processing,
    Completed,
    Cancelled,
    Problem,
}

impl Default for QueueStatus {
    fn default() -> Self {
        Self::Waiting
    }
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Problem => "problem",
        }
    }

    /// Thai label shown to customers
    pub fn label_th(&self) -> &'static str {
        match self {
            Self::Waiting => "รอดำเนินการ",
            Self::Processing => "กำลังดำเนินการ",
            Self::Completed => "เสร็จสิ้น",
            Self::Cancelled => "ยกเลิก",
            Self::Problem => "มีปัญหา",
        }
    }

    /// Whether the request is still pending work
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Waiting | Self::Processing | Self::Problem)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A customer–admin chat thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    /// Normalized customer identifier (see [`crate::normalize_customer_id`])
    pub customer_id: String,
    pub customer_name: String,
    pub status: ConversationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
}

impl Conversation {
    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }
}

/// A single message in a conversation.
///
/// Messages are append-only. Only `is_read` ever changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_role: SenderRole,
    pub sender_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Payload of a message: text or an uploaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Image(String),
}

impl MessageBody {
    /// Split into the `(content, image_url)` column pair
    pub fn into_columns(self) -> (Option<String>, Option<String>) {
        match self {
            MessageBody::Text(text) => (Some(text), None),
            MessageBody::Image(url) => (None, Some(url)),
        }
    }
}

/// Snapshot of a redemption request as seen by the customer-facing lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueItem {
    pub id: Uuid,
    pub queue_number: i64,
    pub product_type: String,
    pub status: QueueStatus,
    pub game_username: Option<String>,
    pub customer_name: Option<String>,
    pub contact_info: Option<String>,
    pub assigned_code: Option<String>,
    /// Waiting requests ahead of this one (only for waiting items)
    #[sqlx(default)]
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl QueueItem {
    /// Case-insensitive substring match over the searchable fields.
    ///
    /// Mirrors the backend's OR'd `ILIKE` predicates.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }

        contains_case_insensitive(&self.queue_number.to_string(), query)
            || [&self.game_username, &self.customer_name, &self.contact_info]
                .into_iter()
                .flatten()
                .any(|field| contains_case_insensitive(field, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn queue_item(number: i64, username: &str, name: &str, contact: &str) -> QueueItem {
        QueueItem {
            id: Uuid::new_v4(),
            queue_number: number,
            product_type: "rov_account".to_string(),
            status: QueueStatus::Waiting,
            game_username: Some(username.to_string()),
            customer_name: Some(name.to_string()),
            contact_info: Some(contact.to_string()),
            assigned_code: None,
            position: None,
            created_at: datetime!(2024-05-01 10:00 UTC),
            updated_at: datetime!(2024-05-01 10:00 UTC),
        }
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&SenderRole::Bot).unwrap(), r#""bot""#);
        assert_eq!(
            serde_json::to_string(&QueueStatus::Cancelled).unwrap(),
            r#""cancelled""#
        );
        let status: ConversationStatus = serde_json::from_str(r#""closed""#).unwrap();
        assert_eq!(status, ConversationStatus::Closed);
    }

    #[test]
    fn test_queue_item_matches_each_field() {
        let item = queue_item(1042, "PlayerName99", "สมชาย ใจดี", "line: somchai_th");

        assert!(item.matches_query("playername"));
        assert!(item.matches_query("สมชาย"));
        assert!(item.matches_query("SOMCHAI"));
        assert!(item.matches_query("104"));
        assert!(!item.matches_query("nobody"));
        assert!(!item.matches_query("   "));
    }

    #[test]
    fn test_queue_item_missing_fields_do_not_match() {
        let mut item = queue_item(7, "a", "b", "c");
        item.game_username = None;
        item.customer_name = None;
        item.contact_info = None;

        assert!(!item.matches_query("a"));
        assert!(item.matches_query("7"));
    }

    #[test]
    fn test_message_body_columns() {
        let (content, image) = MessageBody::Text("hi".into()).into_columns();
        assert_eq!(content.as_deref(), Some("hi"));
        assert!(image.is_none());
    }

    #[test]
    fn test_queue_status_open() {
        assert!(QueueStatus::Waiting.is_open());
        assert!(QueueStatus::Problem.is_open());
        assert!(!QueueStatus::Completed.is_open());
        assert!(!QueueStatus::Cancelled.is_open());
    }
}
