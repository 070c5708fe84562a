//! Pressmaster quote endpoints.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::models::{Quote, QuotePayload, QuoteRequestRecord};
use crate::AppState;

const DEFAULT_AUDIT_LIMIT: i64 = 5;
const MAX_AUDIT_LIMIT: i64 = 50;

/// Optional caller identity forwarded by the storefront for the audit trail.
const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Deserialize)]
pub struct QuoteRequestsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// POST /api/quotes - Request a quote.
///
/// Authentication is enforced by the PSK layer before this handler runs;
/// validation, provider dispatch, and audit logging happen in the service.
pub async fn request_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QuotePayload>,
) -> ApiResult<Quote> {
    let user_id = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());

    let quote = state.quotes.request(user_id, &payload).await?;
    success(quote)
}

/// GET /api/quotes/requests - Recent quote audit rows, newest first.
pub async fn list_quote_requests(
    State(state): State<AppState>,
    Query(query): Query<QuoteRequestsQuery>,
) -> ApiResult<Vec<QuoteRequestRecord>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    let requests = state.repo.list_quote_requests(limit).await?;
    success(requests)
}
