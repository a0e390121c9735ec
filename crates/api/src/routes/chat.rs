//! Customer-facing chat routes
//!
//! Customers are anonymous: every call carries the customer identifier, which
//! is normalized and must own the conversation being touched.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use redeemdesk_shared::{
    validate_customer_id, ChatMessage, Conversation, MessageBody, SenderRole, ServerEvent,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    store::{self, NewMessage},
};

const MAX_CUSTOMER_NAME_LENGTH: usize = 255;
const MAX_CONTENT_LENGTH: usize = 5_000;
const MAX_IMAGE_URL_LENGTH: usize = 2_048;
const MAX_SENDER_ID_LENGTH: usize = 255;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenConversationResponse {
    pub conversation: Conversation,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub customer_id: String,
    #[serde(default = "default_sender_role")]
    pub sender_role: SenderRole,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_sender_role() -> SenderRole {
    SenderRole::Customer
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub object_name: String,
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) fn ensure_chat_enabled(state: &AppState) -> ApiResult<()> {
    if state.config.enable_chat {
        Ok(())
    } else {
        Err(ApiError::ChatDisabled)
    }
}

/// Validate an outgoing message payload: exactly one of text or image
pub(crate) fn validate_message_body(
    content: Option<&str>,
    image_url: Option<&str>,
) -> ApiResult<MessageBody> {
    let content = content.map(str::trim).filter(|c| !c.is_empty());
    let image_url = image_url.map(str::trim).filter(|u| !u.is_empty());

    match (content, image_url) {
        (Some(text), None) => {
            if text.chars().count() > MAX_CONTENT_LENGTH {
                return Err(ApiError::Validation(format!(
                    "Message too long (max {} characters)",
                    MAX_CONTENT_LENGTH
                )));
            }
            Ok(MessageBody::Text(text.to_string()))
        }
        (None, Some(url)) => {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ApiError::Validation("Image URL must be http(s)".into()));
            }
            if url.len() > MAX_IMAGE_URL_LENGTH {
                return Err(ApiError::Validation("Image URL too long".into()));
            }
            Ok(MessageBody::Image(url.to_string()))
        }
        (None, None) => Err(ApiError::Validation("Message cannot be empty".into())),
        (Some(_), Some(_)) => Err(ApiError::Validation(
            "Message must be either text or an image, not both".into(),
        )),
    }
}

/// Load a conversation owned by the given (raw) customer identifier
async fn load_customer_conversation(
    state: &AppState,
    conversation_id: Uuid,
    raw_customer_id: &str,
) -> ApiResult<Conversation> {
    let customer_id = validate_customer_id(raw_customer_id)?;

    let conversation = store::get_conversation(&state.pool, conversation_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Foreign conversations are reported as missing
    if conversation.customer_id != customer_id {
        return Err(ApiError::NotFound);
    }

    Ok(conversation)
}

/// Append a message and push it to every subscriber of the conversation
pub(crate) async fn append_and_broadcast(
    state: &AppState,
    conversation: &Conversation,
    sender_role: SenderRole,
    sender_id: &str,
    body: MessageBody,
) -> ApiResult<ChatMessage> {
    if !conversation.is_active() {
        return Err(ApiError::ConversationClosed);
    }

    let (content, image_url) = body.into_columns();
    let message = store::insert_message(
        &state.pool,
        NewMessage {
            conversation_id: conversation.id,
            sender_role,
            sender_id,
            content: content.as_deref(),
            image_url: image_url.as_deref(),
        },
    )
    .await?;

    state
        .ws_state
        .rooms
        .broadcast(
            &conversation.id,
            ServerEvent::NewMessage {
                conversation_id: conversation.id,
                message: message.clone(),
            },
        )
        .await;

    Ok(message)
}

/// Mark the other side's messages read and broadcast the receipt
pub(crate) async fn mark_read_and_broadcast(
    state: &AppState,
    conversation_id: Uuid,
    reader: SenderRole,
) -> ApiResult<Vec<Uuid>> {
    let authors: &[SenderRole] = match reader {
        SenderRole::Customer => &[SenderRole::Admin, SenderRole::Bot],
        SenderRole::Admin | SenderRole::Bot => &[SenderRole::Customer],
    };

    let message_ids = store::mark_read(&state.pool, conversation_id, authors).await?;

    if !message_ids.is_empty() {
        state
            .ws_state
            .rooms
            .broadcast(
                &conversation_id,
                ServerEvent::MessagesRead {
                    conversation_id,
                    reader,
                    message_ids: message_ids.clone(),
                },
            )
            .await;
    }

    Ok(message_ids)
}

/// Body limit hits become 413; any other multipart failure is the client's fault
fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Find the customer's active conversation or open a new one
pub async fn open_conversation(
    State(state): State<AppState>,
    Json(req): Json<OpenConversationRequest>,
) -> ApiResult<Json<OpenConversationResponse>> {
    ensure_chat_enabled(&state)?;

    let customer_id = validate_customer_id(&req.customer_id)?;
    let customer_name = req
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| req.customer_id.trim());

    if customer_name.chars().count() > MAX_CUSTOMER_NAME_LENGTH {
        return Err(ApiError::Validation(format!(
            "Customer name too long (max {} characters)",
            MAX_CUSTOMER_NAME_LENGTH
        )));
    }

    let (conversation, created) =
        store::find_or_create_conversation(&state.pool, &customer_id, customer_name).await?;

    if created {
        tracing::info!(
            conversation_id = %conversation.id,
            customer_id = %customer_id,
            "Conversation opened"
        );
    }

    Ok(Json(OpenConversationResponse {
        conversation,
        created,
    }))
}

/// Full message list of a conversation, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    ensure_chat_enabled(&state)?;

    let conversation = load_customer_conversation(&state, conversation_id, &query.customer_id).await?;
    let messages = store::list_messages(&state.pool, conversation.id).await?;

    Ok(Json(MessagesResponse { messages }))
}

/// Append a customer or bot message
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<ChatMessage>> {
    ensure_chat_enabled(&state)?;

    if req.sender_role == SenderRole::Admin {
        return Err(ApiError::Validation(
            "Admin messages must be sent from the dashboard".into(),
        ));
    }

    let body = validate_message_body(req.content.as_deref(), req.image_url.as_deref())?;
    let conversation = load_customer_conversation(&state, conversation_id, &req.customer_id).await?;

    let sender_id = match (&req.sender_id, req.sender_role) {
        (Some(id), _) if !id.trim().is_empty() => id.trim().to_string(),
        (_, SenderRole::Bot) => "bot".to_string(),
        _ => conversation.customer_id.clone(),
    };
    if sender_id.chars().count() > MAX_SENDER_ID_LENGTH {
        return Err(ApiError::Validation("Sender id too long".into()));
    }

    let message = append_and_broadcast(&state, &conversation, req.sender_role, &sender_id, body).await?;

    tracing::debug!(
        conversation_id = %conversation.id,
        message_id = %message.id,
        sender_role = req.sender_role.as_str(),
        "Chat message appended"
    );

    Ok(Json(message))
}

/// Mark admin and bot messages as read by the customer
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(query): Json<CustomerQuery>,
) -> ApiResult<Json<MarkReadResponse>> {
    ensure_chat_enabled(&state)?;

    let conversation = load_customer_conversation(&state, conversation_id, &query.customer_id).await?;
    let message_ids = mark_read_and_broadcast(&state, conversation.id, SenderRole::Customer).await?;

    Ok(Json(MarkReadResponse { message_ids }))
}

/// Upload an image for an image message; returns its public URL
pub async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    ensure_chat_enabled(&state)?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let object_name = state.media.store_image(&content_type, &bytes).await?;

        return Ok(Json(UploadResponse {
            url: state.config.media_url(&object_name),
            object_name,
        }));
    }

    Err(ApiError::BadRequest("Missing 'file' field".into()))
}
