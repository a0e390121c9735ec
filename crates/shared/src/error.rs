//! Error types for Redeemdesk

use thiserror::Error;

/// Input rejected by the shared domain checks
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("Validation error: {0}")]
    Validation(String),
}
