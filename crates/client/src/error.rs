//! Client error types

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Chat backend is not configured")]
    Offline,

    #[error("Not found")]
    NotFound,

    #[error("Conversation is closed")]
    ConversationClosed,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Subscription rejected: {0}")]
    Subscription(String),

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Message sent too soon after the previous one")]
    TooFast,

    #[error("Synchronizer has shut down")]
    Closed,
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::WebSocket(Box::new(err))
    }
}

impl From<redeemdesk_shared::DeskError> for ClientError {
    fn from(err: redeemdesk_shared::DeskError) -> Self {
        match err {
            redeemdesk_shared::DeskError::Validation(msg) => ClientError::Validation(msg),
        }
    }
}

impl ClientError {
    /// Map a backend error body (`{"error":{"code","message"}}`) to a variant
    pub fn from_api(status: u16, code: &str, message: String) -> Self {
        match code {
            "NOT_FOUND" => ClientError::NotFound,
            "CONVERSATION_CLOSED" => ClientError::ConversationClosed,
            "VALIDATION_ERROR" | "BAD_REQUEST" => ClientError::Validation(message),
            "CHAT_DISABLED" => ClientError::Offline,
            _ => ClientError::Api {
                status,
                code: code.to_string(),
                message,
            },
        }
    }

    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            // Retry network-related errors and timeouts
            ClientError::Http(_) => true,
            ClientError::WebSocket(_) => true,
            ClientError::Timeout => true,
            ClientError::Api { status, .. } => *status >= 500,

            // Don't retry permanent errors
            ClientError::Json(_) => false,
            ClientError::Offline => false,
            ClientError::NotFound => false,
            ClientError::ConversationClosed => false,
            ClientError::Validation(_) => false,
            ClientError::Subscription(_) => false,
            ClientError::TooFast => false,
            ClientError::Closed => false,
        }
    }

    /// Thai toast text shown to the customer
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::Offline => "ระบบแชทยังไม่พร้อมใช้งานในขณะนี้",
            ClientError::NotFound => "ไม่พบข้อมูลที่ต้องการ",
            ClientError::ConversationClosed => "การสนทนานี้ถูกปิดแล้ว กรุณาเริ่มแชทใหม่",
            ClientError::Validation(_) => "ข้อมูลไม่ถูกต้อง กรุณาตรวจสอบอีกครั้ง",
            ClientError::TooFast => "กรุณารอสักครู่ก่อนส่งข้อความถัดไป",
            ClientError::Closed => "การเชื่อมต่อแชทถูกปิดแล้ว",
            _ => "ส่งข้อความไม่สำเร็จ กรุณาลองใหม่อีกครั้ง",
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_customer_id_is_validation() {
        let err: ClientError = redeemdesk_shared::validate_customer_id("   ")
            .unwrap_err()
            .into();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_api_codes() {
        assert!(matches!(
            ClientError::from_api(404, "NOT_FOUND", "x".into()),
            ClientError::NotFound
        ));
        assert!(matches!(
            ClientError::from_api(409, "CONVERSATION_CLOSED", "x".into()),
            ClientError::ConversationClosed
        ));
        assert!(matches!(
            ClientError::from_api(503, "CHAT_DISABLED", "x".into()),
            ClientError::Offline
        ));
        assert!(matches!(
            ClientError::from_api(500, "DATABASE_ERROR", "x".into()),
            ClientError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::from_api(502, "BAD_GATEWAY", String::new()).is_transient());
        assert!(!ClientError::NotFound.is_transient());
        assert!(!ClientError::TooFast.is_transient());
    }

    #[test]
    fn test_user_messages_are_thai() {
        let transient = ClientError::Timeout.user_message();
        assert!(redeemdesk_shared::contains_thai(transient));
        assert_ne!(transient, ClientError::Offline.user_message());
    }
}
