//! Cause API endpoints.

use axum::{extract::State, Json};

use super::{success, ApiResult};
use crate::aggregate::{self, CauseStats};
use crate::errors::AppError;
use crate::models::{Cause, CreateCauseRequest};
use crate::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_WEBSITE_URL_LEN: usize = 200;

/// GET /api/causes - List all causes.
pub async fn list_causes(State(state): State<AppState>) -> ApiResult<Vec<Cause>> {
    let causes = state.repo.list_causes().await?;
    success(causes)
}

/// POST /api/causes - Create a new cause.
pub async fn create_cause(
    State(state): State<AppState>,
    Json(request): Json<CreateCauseRequest>,
) -> ApiResult<Cause> {
    validate_cause(&request)?;

    let cause = state.repo.create_cause(&request).await?;
    success(cause)
}

/// GET /api/causes/stats - Per-cause donation rollup.
pub async fn cause_stats(State(state): State<AppState>) -> ApiResult<Vec<CauseStats>> {
    let causes = state.repo.list_causes().await?;
    let donations = state.repo.list_donations(None, None).await?;
    success(aggregate::cause_stats(&causes, &donations))
}

fn validate_cause(request: &CreateCauseRequest) -> Result<(), AppError> {
    let mut details = Vec::new();

    if request.name.trim().is_empty() {
        details.push("name must be a non-empty string".to_string());
    } else if request.name.len() > MAX_NAME_LEN {
        details.push(format!("name must be at most {} characters", MAX_NAME_LEN));
    }

    if request.description.trim().is_empty() {
        details.push("description must be a non-empty string".to_string());
    }

    if let Some(url) = &request.website_url {
        if url.len() > MAX_WEBSITE_URL_LEN {
            details.push(format!(
                "websiteUrl must be at most {} characters",
                MAX_WEBSITE_URL_LEN
            ));
        }
    }

    if request.created_by.trim().is_empty() {
        details.push("createdBy must be a non-empty string".to_string());
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
