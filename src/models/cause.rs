//! Cause model: the fundraising categories donations and orders attribute to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A nonprofit/fundraising category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a new cause.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCauseRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub website_url: Option<String>,
    /// User ID of the owner
    pub created_by: String,
}
