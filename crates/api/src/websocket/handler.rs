//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, authentication, and event routing.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use redeemdesk_shared::{validate_customer_id, ClientEvent, ServerEvent};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{state::AppState, store};

use super::{
    connection::{Connection, Principal},
    state::WebSocketState,
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    customer_id: Option<String>,
    admin_token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// Customers identify with `?customer_id=`, the dashboard with `?admin_token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    if !app_state.config.enable_chat {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let principal = resolve_principal(&app_state, &params)?;

    tracing::info!(admin = principal.is_admin(), "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, principal, app_state)))
}

fn resolve_principal(app_state: &AppState, params: &WebSocketQuery) -> Result<Principal, StatusCode> {
    if let Some(token) = &params.admin_token {
        if app_state.admin_auth.verify(token) {
            return Ok(Principal::Admin);
        }
        tracing::warn!("WebSocket auth failed: invalid admin token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    match params.customer_id.as_deref().map(validate_customer_id) {
        Some(Ok(customer_id)) => Ok(Principal::Customer(customer_id)),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "WebSocket auth failed: invalid customer id");
            Err(StatusCode::BAD_REQUEST)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, principal: Principal, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(principal, tx)).await;
    let session_id = conn.session_id;

    let _ = conn.send(ServerEvent::Connected { session_id });

    // Forward queued events to the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, Arc::clone(&conn), &ws_state, &app_state).await;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "Failed to parse client event");
                    let _ = conn.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            // Axum answers pings itself; binary frames are not part of the protocol
            _ => {}
        }
    }

    tracing::info!(session_id = %session_id, "WebSocket connection closing");
    ws_state.remove_connection(&session_id).await;

    send_task.abort();
}

/// Handle client event
async fn handle_client_event(
    event: ClientEvent,
    conn: Arc<Connection>,
    ws_state: &WebSocketState,
    app_state: &AppState,
) {
    match event {
        ClientEvent::Subscribe { conversation_id } => {
            match verify_conversation_access(app_state, &conn.principal, conversation_id).await {
                Ok(true) => {
                    conn.subscribe(conversation_id).await;
                    ws_state.rooms.join(conversation_id, Arc::clone(&conn)).await;
                    let _ = conn.send(ServerEvent::Subscribed { conversation_id });
                }
                Ok(false) => {
                    let _ = conn.send(ServerEvent::Error {
                        message: "Access denied to conversation".to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to verify conversation access");
                    let _ = conn.send(ServerEvent::Error {
                        message: "Failed to verify access".to_string(),
                    });
                }
            }
        }

        ClientEvent::Unsubscribe { conversation_id } => {
            conn.unsubscribe(conversation_id).await;
            ws_state.rooms.leave(&conversation_id, &conn.session_id).await;
        }

        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}

/// Admins may watch any conversation; customers only their own
async fn verify_conversation_access(
    app_state: &AppState,
    principal: &Principal,
    conversation_id: Uuid,
) -> Result<bool, sqlx::Error> {
    match principal {
        Principal::Admin => store::conversation_exists(&app_state.pool, conversation_id).await,
        Principal::Customer(customer_id) => {
            store::conversation_belongs_to(&app_state.pool, conversation_id, customer_id).await
        }
    }
}
