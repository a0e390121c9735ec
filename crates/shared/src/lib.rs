//! Redeemdesk Shared Types and Utilities
//!
//! Domain types, identifier normalization, and database helpers used by both
//! the Redeemdesk service and the chat client.

pub mod db;
pub mod error;
pub mod events;
pub mod text;
pub mod types;

pub use db::*;
pub use error::*;
pub use events::{ClientEvent, ServerEvent};
pub use text::*;
pub use types::*;
