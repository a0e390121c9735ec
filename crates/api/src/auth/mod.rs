//! Authentication module for Redeemdesk
//!
//! Customers are anonymous and identified by their normalized customer id.
//! Admin routes require the static dashboard token.

pub mod admin_token;

pub use admin_token::{require_admin, AdminAuth};
