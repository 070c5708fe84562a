//! Pressmaster quote models: request payload, quote response, and the
//! append-only audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a quote was synthesized locally or fetched from the upstream
/// service. Resolved once at startup from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuoteMode {
    Stub,
    Live,
}

impl QuoteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteMode::Stub => "stub",
            QuoteMode::Live => "live",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stub" => Some(QuoteMode::Stub),
            "live" => Some(QuoteMode::Live),
            _ => None,
        }
    }
}

/// Terminal status of one quote invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Success,
    Error,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Success => "success",
            QuoteStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QuoteStatus::Pending),
            "success" => Some(QuoteStatus::Success),
            "error" => Some(QuoteStatus::Error),
            _ => None,
        }
    }
}

/// Request body accepted by the quote endpoint and sent upstream in live mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePayload {
    pub project: String,
    pub specs: String,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<String>,
}

/// Priced portion of a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteAmount {
    pub amount: f64,
    pub currency: String,
}

/// A quote as returned to the caller, stub or live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub mock: bool,
    pub quote: QuoteAmount,
    pub turnaround: String,
    pub notes: String,
}

/// Input for appending one row to the quote audit log.
#[derive(Debug, Clone)]
pub struct NewQuoteRequest {
    pub user_id: Option<String>,
    pub donation_id: Option<String>,
    pub mode: QuoteMode,
    pub status: QuoteStatus,
    pub request_body: serde_json::Value,
    pub response_body: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// One row of the append-only quote audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequestRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<String>,
    #[serde(rename = "type")]
    pub request_type: String,
    pub mode: QuoteMode,
    pub status: QuoteStatus,
    pub request_body: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
