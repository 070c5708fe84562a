//! Donation API endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{success, ApiResult};
use crate::aggregate::{self, Totals};
use crate::errors::AppError;
use crate::models::{CreateDonationRequest, Donation};
use crate::AppState;

const MAX_DONOR_NAME_LEN: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationListQuery {
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /api/donations - List donations, optionally filtered by cause or user.
pub async fn list_donations(
    State(state): State<AppState>,
    Query(query): Query<DonationListQuery>,
) -> ApiResult<Vec<Donation>> {
    let donations = state
        .repo
        .list_donations(query.cause.as_deref(), query.user_id.as_deref())
        .await?;
    success(donations)
}

/// POST /api/donations - Create a new donation.
pub async fn create_donation(
    State(state): State<AppState>,
    Json(request): Json<CreateDonationRequest>,
) -> ApiResult<Donation> {
    validate_donation(&request)?;

    let donation = state.repo.create_donation(&request).await?;

    // The feed event goes out only after the row is durable.
    state.feed.publish(&donation);

    success(donation)
}

/// GET /api/donations/totals - Snapshot aggregation over the donation table.
pub async fn donation_totals(
    State(state): State<AppState>,
    Query(query): Query<DonationListQuery>,
) -> ApiResult<Totals> {
    let donations = state
        .repo
        .list_donations(query.cause.as_deref(), None)
        .await?;
    success(aggregate::snapshot(&donations, Utc::now()))
}

/// Malformed amounts are rejected here, never coerced to zero downstream.
fn validate_donation(request: &CreateDonationRequest) -> Result<(), AppError> {
    let mut details = Vec::new();

    if request.donor_name.trim().is_empty() {
        details.push("donorName must be a non-empty string".to_string());
    } else if request.donor_name.len() > MAX_DONOR_NAME_LEN {
        details.push(format!(
            "donorName must be at most {} characters",
            MAX_DONOR_NAME_LEN
        ));
    }

    if request.amount <= Decimal::ZERO {
        details.push("amount must be greater than zero".to_string());
    }

    if request.cause.trim().is_empty() {
        details.push("cause must be a non-empty string".to_string());
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation {
            message: "Invalid input".to_string(),
            details,
        })
    }
}
