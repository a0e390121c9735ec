//! Admin dashboard chat routes
//!
//! Mounted behind the admin token middleware; handlers assume the caller is
//! staff.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use redeemdesk_shared::{ChatMessage, Conversation, ConversationStatus, SenderRole, ServerEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    routes::chat::{
        append_and_broadcast, ensure_chat_enabled, mark_read_and_broadcast, validate_message_body,
        MarkReadResponse,
    },
    state::AppState,
    store::{self, ConversationSummary},
};

const ADMIN_SENDER_ID: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub status: Option<ConversationStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct AdminReplyRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Display id of the replying staff member
    #[serde(default)]
    pub sender_id: Option<String>,
}

async fn load_conversation(state: &AppState, conversation_id: Uuid) -> ApiResult<Conversation> {
    store::get_conversation(&state.pool, conversation_id)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Inbox listing with unread counters
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<ConversationsListResponse>> {
    ensure_chat_enabled(&state)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let status = query.status.as_ref().map(ConversationStatus::as_str);

    let conversations = store::list_conversation_summaries(&state.pool, status, limit).await?;

    Ok(Json(ConversationsListResponse { conversations }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ConversationDetailResponse>> {
    ensure_chat_enabled(&state)?;

    let conversation = load_conversation(&state, conversation_id).await?;
    let messages = store::list_messages(&state.pool, conversation.id).await?;

    Ok(Json(ConversationDetailResponse {
        conversation,
        messages,
    }))
}

/// Staff reply; pushed to the customer in real time
pub async fn reply(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<AdminReplyRequest>,
) -> ApiResult<Json<ChatMessage>> {
    ensure_chat_enabled(&state)?;

    let body = validate_message_body(req.content.as_deref(), req.image_url.as_deref())?;
    let conversation = load_conversation(&state, conversation_id).await?;

    let sender_id = req
        .sender_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(ADMIN_SENDER_ID);

    let message =
        append_and_broadcast(&state, &conversation, SenderRole::Admin, sender_id, body).await?;

    tracing::info!(
        conversation_id = %conversation.id,
        message_id = %message.id,
        "Admin replied to conversation"
    );

    Ok(Json(message))
}

/// Mark the customer's messages read by staff
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<MarkReadResponse>> {
    ensure_chat_enabled(&state)?;

    let conversation = load_conversation(&state, conversation_id).await?;
    let message_ids = mark_read_and_broadcast(&state, conversation.id, SenderRole::Admin).await?;

    Ok(Json(MarkReadResponse { message_ids }))
}

/// Close an active conversation; the customer's next open starts a new one
pub async fn close(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    ensure_chat_enabled(&state)?;

    let conversation = match store::close_conversation(&state.pool, conversation_id).await? {
        Some(closed) => closed,
        None => {
            // Distinguish missing from already closed
            load_conversation(&state, conversation_id).await?;
            return Err(ApiError::ConversationClosed);
        }
    };

    state
        .ws_state
        .rooms
        .broadcast(
            &conversation.id,
            ServerEvent::ConversationUpdated {
                conversation_id: conversation.id,
                status: conversation.status,
            },
        )
        .await;

    tracing::info!(conversation_id = %conversation.id, "Conversation closed");

    Ok(Json(conversation))
}
