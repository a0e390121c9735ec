//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::{auth::AdminAuth, config::Config, media::MediaStore, websocket::WebSocketState};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub ws_state: WebSocketState,
    pub admin_auth: AdminAuth,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let admin_auth = AdminAuth::new(&config.admin_api_token);
        let media = MediaStore::new(config.media_dir.clone(), config.media_max_bytes);

        Self {
            pool,
            config: Arc::new(config),
            ws_state: WebSocketState::new(),
            admin_auth,
            media,
        }
    }
}
