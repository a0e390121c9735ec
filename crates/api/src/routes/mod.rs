//! API routes

pub mod admin;
pub mod chat;
pub mod health;
pub mod queue;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{auth::require_admin, state::AppState, websocket::ws_handler};

/// Multipart framing allowance on top of the media size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Global request body limit for JSON routes
const JSON_BODY_LIMIT_BYTES: usize = 1024 * 1024;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Customer routes (anonymous, identified by customer_id)
    let public_api_routes = Router::new()
        .route("/chat/conversations", post(chat::open_conversation))
        .route(
            "/chat/conversations/:conversation_id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/chat/conversations/:conversation_id/read", post(chat::mark_read))
        .route("/queue/lookup", get(queue::lookup))
        .route(
            "/media",
            post(chat::upload_media).layer(DefaultBodyLimit::max(
                state.config.media_max_bytes + MULTIPART_OVERHEAD_BYTES,
            )),
        );

    // Admin dashboard routes (static bearer token)
    let admin_api_routes = Router::new()
        .route("/admin/chat/conversations", get(admin::list_conversations))
        .route("/admin/chat/conversations/:conversation_id", get(admin::get_conversation))
        .route("/admin/chat/conversations/:conversation_id/reply", post(admin::reply))
        .route("/admin/chat/conversations/:conversation_id/read", post(admin::mark_read))
        .route("/admin/chat/conversations/:conversation_id/close", post(admin::close))
        .route_layer(middleware::from_fn_with_state(
            state.admin_auth.clone(),
            require_admin,
        ));

    // WebSocket routes (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws/chat", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(admin_api_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .nest_service("/media", ServeDir::new(state.media.dir()))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT_BYTES))
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    const TOKEN: &str = "router-test-admin-token-32-characters";

    fn test_config(enable_chat: bool) -> Config {
        Config {
            bind_address: "127.0.0.1:0".into(),
            public_url: "http://localhost:3000".into(),
            cors_allowed_origins: vec!["https://shop.example.com".into()],
            database_url: "postgres://localhost/redeemdesk_test".into(),
            database_max_connections: 1,
            admin_api_token: TOKEN.into(),
            media_dir: std::env::temp_dir(),
            media_max_bytes: 1024,
            enable_chat,
        }
    }

    /// Router over a lazy pool; only paths that never reach the database are exercised
    fn test_router(enable_chat: bool) -> Router {
        let config = test_config(enable_chat);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(&config.database_url)
            .unwrap();
        create_router(AppState::new(pool, config))
    }

    async fn error_code(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["error"]["code"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = test_router(true)
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let response = test_router(true)
            .oneshot(
                Request::get("/api/v1/admin/chat/conversations")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = test_router(true)
            .oneshot(
                Request::get("/api/v1/admin/chat/conversations")
                    .header(AUTHORIZATION, "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_queue_lookup_requires_query() {
        let response = test_router(true)
            .oneshot(
                Request::get("/api/v1/queue/lookup?q=%20%20")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_chat_disabled() {
        let response = test_router(false)
            .oneshot(
                Request::post("/api/v1/chat/conversations")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"customer_id":"player1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_code(response).await, "CHAT_DISABLED");
    }

    #[tokio::test]
    async fn test_send_rejects_empty_message() {
        let uri = format!("/api/v1/chat/conversations/{}/messages", uuid::Uuid::new_v4());
        let response = test_router(true)
            .oneshot(
                Request::post(uri)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"customer_id":"player1","content":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_rejects_admin_role() {
        let uri = format!("/api/v1/chat/conversations/{}/messages", uuid::Uuid::new_v4());
        let response = test_router(true)
            .oneshot(
                Request::post(uri)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"customer_id":"player1","sender_role":"admin","content":"hi"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::post("/api/v1/media")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    fn file_part(data: &[u8], closed: bool) -> Vec<u8> {
        let mut body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"shot.png\"\r\n",
            "Content-Type: image/png\r\n\r\n",
        )
        .as_bytes()
        .to_vec();
        body.extend_from_slice(data);
        if closed {
            body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");
        }
        body
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_payload_too_large() {
        let response = test_router(true)
            .oneshot(upload_request(file_part(&vec![0u8; 200 * 1024], true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error_code(response).await, "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_upload_truncated_body_is_bad_request() {
        let response = test_router(true)
            .oneshot(upload_request(file_part(b"\x89PNG", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "BAD_REQUEST");
    }
}
