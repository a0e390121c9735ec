//! WebSocket support for real-time chat
//!
//! Pushes conversation changes to subscribed clients:
//! - New messages (customer, admin, and bot)
//! - Read receipts
//! - Conversation status changes
//!
//! # Architecture
//!
//! - **Connection**: An identified WebSocket connection (customer or admin)
//! - **Room**: Conversation-based pub/sub for broadcasting events
//! - **State**: Global WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//!
//! Event types live in `redeemdesk_shared::events` so the client crate decodes
//! the same wire format.

pub mod connection;
pub mod handler;
pub mod room;
pub mod state;

pub use handler::ws_handler;
pub use state::WebSocketState;
