//! Public queue lookup

use axum::{
    extract::{Query, State},
    Json,
};
use redeemdesk_shared::QueueItem;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    store,
};

const MAX_QUERY_LENGTH: usize = 100;

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub items: Vec<QueueItem>,
}

/// Validate a lookup term; returns the trimmed query
pub(crate) fn validate_lookup_query(raw: &str) -> ApiResult<&str> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(ApiError::Validation("Search query is required".into()));
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(ApiError::Validation(format!(
            "Search query too long (max {} characters)",
            MAX_QUERY_LENGTH
        )));
    }
    Ok(query)
}

/// Search queue items by queue number, username, name, or contact.
///
/// Every match is returned; the customer picks their own entry from the list.
pub async fn lookup(
    State(state): State<AppState>,
    Query(params): Query<LookupQuery>,
) -> ApiResult<Json<LookupResponse>> {
    let query = validate_lookup_query(&params.q)?;
    let items = store::search_queue(&state.pool, query).await?;

    tracing::debug!(results = items.len(), "Queue lookup");

    Ok(Json(LookupResponse { items }))
}
