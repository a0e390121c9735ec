//! Redeemdesk API Library
//!
//! HTTP and WebSocket service backing the storefront support chat, the admin
//! inbox, and the public queue lookup.

pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
