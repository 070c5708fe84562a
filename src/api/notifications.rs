//! Notification API endpoints.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::Notification;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /api/notifications - A user's notifications, unread first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Vec<Notification>> {
    let Some(user_id) = query.user_id.as_deref() else {
        return Err(AppError::validation("userId query parameter is required"));
    };

    let notifications = state.repo.list_notifications(user_id).await?;
    success(notifications)
}

/// POST /api/notifications/:id/read - Mark one notification read.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Notification> {
    let notification = state.repo.mark_notification_read(&id).await?;
    success(notification)
}
