//! Order API endpoints for the checkout flow.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateOrderRequest, Order};
use crate::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_LINE_LEN: usize = 200;
const MAX_CITY_LEN: usize = 100;
const MAX_STATE_LEN: usize = 50;
const MAX_POSTAL_CODE_LEN: usize = 20;
const MAX_COUNTRY_LEN: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /api/orders - Place an order.
///
/// The order, its items, and the order's donation (when items carry one) are
/// written in a single transaction. The quote automation runs asynchronously
/// off the feed event and can never fail the checkout.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    validate_order(&request)?;

    let (order, donation) = state.repo.create_order(&request).await?;

    // Post-commit: surface the order's donation on the change feed.
    if let Some(donation) = &donation {
        state.feed.publish(donation);
    }

    success(order)
}

/// GET /api/orders/:id - Fetch one order with its items.
pub async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    match state.repo.get_order(&id).await? {
        Some(order) => success(order),
        None => Err(AppError::NotFound(format!("Order {} not found", id))),
    }
}

/// GET /api/orders - Order history, newest first.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<Vec<Order>> {
    let orders = state.repo.list_orders(query.user_id.as_deref()).await?;
    success(orders)
}

fn validate_order(request: &CreateOrderRequest) -> Result<(), AppError> {
    let mut details = Vec::new();

    if request.user_id.trim().is_empty() {
        details.push("userId must be a non-empty string".to_string());
    }

    let shipping = &request.shipping;
    check_len(&mut details, "shipping.name", &shipping.name, MAX_NAME_LEN);
    check_len(&mut details, "shipping.line1", &shipping.line1, MAX_LINE_LEN);
    if let Some(line2) = &shipping.line2 {
        if line2.len() > MAX_LINE_LEN {
            details.push(format!(
                "shipping.line2 must be at most {} characters",
                MAX_LINE_LEN
            ));
        }
    }
    check_len(&mut details, "shipping.city", &shipping.city, MAX_CITY_LEN);
    check_len(&mut details, "shipping.state", &shipping.state, MAX_STATE_LEN);
    check_len(
        &mut details,
        "shipping.postalCode",
        &shipping.postal_code,
        MAX_POSTAL_CODE_LEN,
    );
    check_len(
        &mut details,
        "shipping.country",
        &shipping.country,
        MAX_COUNTRY_LEN,
    );

    if request.items.is_empty() {
        details.push("items must not be empty".to_string());
    }
    for (index, item) in request.items.iter().enumerate() {
        if item.product_name.trim().is_empty() {
            details.push(format!("items[{}].productName is required", index));
        }
        if item.quantity < 1 {
            details.push(format!("items[{}].quantity must be at least 1", index));
        }
        if item.price < Decimal::ZERO {
            details.push(format!("items[{}].price must not be negative", index));
        }
        if item.donation_amount < Decimal::ZERO {
            details.push(format!(
                "items[{}].donationAmount must not be negative",
                index
            ));
        }
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

fn check_len(details: &mut Vec<String>, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        details.push(format!("{} is required", field));
    } else if value.len() > max {
        details.push(format!("{} must be at most {} characters", field, max));
    }
}
