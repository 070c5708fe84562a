//! Pressmaster quote service.
//!
//! The provider strategy is selected once at startup: stub when no upstream
//! credential is configured, live otherwise. Live failures degrade to
//! stub-shaped pricing instead of propagating raw upstream errors. Every
//! invocation appends one row to the quote audit log, best effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{NewQuoteRequest, Quote, QuoteAmount, QuoteMode, QuotePayload, QuoteStatus};

const MAX_PROJECT_LEN: usize = 200;
const MAX_SPECS_LEN: usize = 1000;
const MAX_QUANTITY: i64 = 10_000;

/// Stub pricing: flat setup fee plus a per-unit cost.
const STUB_SETUP_FEE: f64 = 125.0;
const STUB_UNIT_PRICE: f64 = 3.50;
const STUB_TURNAROUND: &str = "5-7 business days";

/// Validate a quote payload, naming every failing field.
pub fn validate_payload(payload: &QuotePayload) -> Result<(), AppError> {
    let mut details = Vec::new();

    if payload.project.trim().is_empty() {
        details.push("project must be a non-empty string".to_string());
    } else if payload.project.len() > MAX_PROJECT_LEN {
        details.push(format!(
            "project must be at most {} characters",
            MAX_PROJECT_LEN
        ));
    }

    if payload.specs.trim().is_empty() {
        details.push("specs must be a non-empty string".to_string());
    } else if payload.specs.len() > MAX_SPECS_LEN {
        details.push(format!("specs must be at most {} characters", MAX_SPECS_LEN));
    }

    if payload.quantity < 1 || payload.quantity > MAX_QUANTITY {
        details.push(format!("quantity must be between 1 and {}", MAX_QUANTITY));
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

/// Outcome of one provider invocation. `degraded` carries the upstream
/// failure when live pricing fell back to a stub-shaped quote.
#[derive(Debug, Clone)]
pub struct QuoteOutcome {
    pub quote: Quote,
    pub degraded: Option<String>,
}

/// Strategy interface over stub and live quoting.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn mode(&self) -> QuoteMode;
    async fn request_quote(&self, payload: &QuotePayload) -> QuoteOutcome;
}

/// Synthesize a deterministic stub quote for a validated payload.
pub fn stub_quote(payload: &QuotePayload) -> Quote {
    let amount = STUB_SETUP_FEE + STUB_UNIT_PRICE * payload.quantity as f64;
    Quote {
        mock: true,
        quote: QuoteAmount {
            amount: (amount * 100.0).round() / 100.0,
            currency: "USD".to_string(),
        },
        turnaround: STUB_TURNAROUND.to_string(),
        notes: format!(
            "Stub quote for '{}' ({} unit{}). Configure PRESSMASTER_API_KEY for live pricing.",
            payload.project,
            payload.quantity,
            if payload.quantity == 1 { "" } else { "s" }
        ),
    }
}

/// Local quote synthesis; never touches the network.
pub struct StubQuoteProvider;

#[async_trait]
impl QuoteProvider for StubQuoteProvider {
    fn mode(&self) -> QuoteMode {
        QuoteMode::Stub
    }

    async fn request_quote(&self, payload: &QuotePayload) -> QuoteOutcome {
        QuoteOutcome {
            quote: stub_quote(payload),
            degraded: None,
        }
    }
}

/// Upstream response shape; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct UpstreamQuote {
    quote: UpstreamAmount,
    #[serde(default)]
    turnaround: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamAmount {
    amount: f64,
    currency: String,
}

/// One HTTP call per quote against the real Pressmaster API.
pub struct LiveQuoteProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl LiveQuoteProvider {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    async fn call_upstream(&self, payload: &QuotePayload) -> Result<Quote, String> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("transport error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("upstream returned {}", status));
        }

        let upstream: UpstreamQuote = response
            .json()
            .await
            .map_err(|e| format!("malformed upstream response: {}", e))?;

        Ok(Quote {
            mock: false,
            quote: QuoteAmount {
                amount: upstream.quote.amount,
                currency: upstream.quote.currency,
            },
            turnaround: upstream
                .turnaround
                .unwrap_or_else(|| STUB_TURNAROUND.to_string()),
            notes: upstream.notes.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl QuoteProvider for LiveQuoteProvider {
    fn mode(&self) -> QuoteMode {
        QuoteMode::Live
    }

    async fn request_quote(&self, payload: &QuotePayload) -> QuoteOutcome {
        match self.call_upstream(payload).await {
            Ok(quote) => QuoteOutcome {
                quote,
                degraded: None,
            },
            Err(reason) => {
                tracing::warn!("Live quote failed ({}); substituting stub pricing", reason);
                let mut quote = stub_quote(payload);
                quote.notes = format!(
                    "Upstream quote unavailable ({}); stub pricing substituted.",
                    reason
                );
                QuoteOutcome {
                    quote,
                    degraded: Some(reason),
                }
            }
        }
    }
}

/// The Quote Service Boundary: validation, provider dispatch, audit logging.
pub struct QuoteService {
    provider: Arc<dyn QuoteProvider>,
    repo: Arc<Repository>,
}

impl QuoteService {
    /// Select the provider once from configuration.
    pub fn from_config(config: &Config, repo: Arc<Repository>) -> Result<Self, AppError> {
        let provider: Arc<dyn QuoteProvider> = match &config.pressmaster_api_key {
            Some(key) => Arc::new(LiveQuoteProvider::new(
                config.pressmaster_url.clone(),
                key.clone(),
                config.quote_timeout,
            )?),
            None => Arc::new(StubQuoteProvider),
        };

        Ok(Self { provider, repo })
    }

    pub fn mode(&self) -> QuoteMode {
        self.provider.mode()
    }

    /// Run one quote invocation end to end.
    ///
    /// Validation failures reject before any side effect; afterwards exactly
    /// one audit row is appended regardless of outcome, and an audit failure
    /// never fails the quote.
    pub async fn request(
        &self,
        user_id: Option<&str>,
        payload: &QuotePayload,
    ) -> Result<Quote, AppError> {
        validate_payload(payload)?;

        let outcome = self.provider.request_quote(payload).await;

        let audit = NewQuoteRequest {
            user_id: user_id.map(str::to_string),
            donation_id: payload.donation_id.clone(),
            mode: self.provider.mode(),
            status: if outcome.degraded.is_some() {
                QuoteStatus::Error
            } else {
                QuoteStatus::Success
            },
            request_body: serde_json::to_value(payload).unwrap_or_default(),
            response_body: serde_json::to_value(&outcome.quote).ok(),
            error_message: outcome.degraded.clone(),
        };
        if let Err(e) = self.repo.record_quote_request(&audit).await {
            tracing::warn!("Failed to record quote audit row: {}", e);
        }

        Ok(outcome.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(quantity: i64) -> QuotePayload {
        QuotePayload {
            project: "Print Power Purpose".to_string(),
            specs: "Check-drop campaign assets".to_string(),
            quantity,
            donation_id: None,
        }
    }

    #[test]
    fn test_validate_accepts_good_payload() {
        assert!(validate_payload(&payload(1)).is_ok());
        assert!(validate_payload(&payload(MAX_QUANTITY)).is_ok());
    }

    #[test]
    fn test_validate_enumerates_failing_fields() {
        let bad = QuotePayload {
            project: "".to_string(),
            specs: "   ".to_string(),
            quantity: 0,
            donation_id: None,
        };

        match validate_payload(&bad) {
            Err(AppError::Validation { details, .. }) => {
                assert_eq!(details.len(), 3);
                assert!(details.iter().any(|d| d.contains("project")));
                assert!(details.iter().any(|d| d.contains("specs")));
                assert!(details.iter().any(|d| d.contains("quantity")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_oversized_fields() {
        let mut p = payload(1);
        p.project = "x".repeat(MAX_PROJECT_LEN + 1);
        p.specs = "y".repeat(MAX_SPECS_LEN + 1);

        match validate_payload(&p) {
            Err(AppError::Validation { details, .. }) => assert_eq!(details.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_excess_quantity() {
        assert!(validate_payload(&payload(MAX_QUANTITY + 1)).is_err());
    }

    #[test]
    fn test_stub_quote_is_deterministic() {
        let a = stub_quote(&payload(10));
        let b = stub_quote(&payload(10));
        assert_eq!(a.quote.amount, b.quote.amount);
        assert_eq!(a.quote.amount, 160.0);
        assert_eq!(a.quote.currency, "USD");
        assert!(a.mock);
    }

    #[tokio::test]
    async fn test_stub_provider_never_degrades() {
        let provider = StubQuoteProvider;
        let outcome = provider.request_quote(&payload(1)).await;
        assert!(outcome.quote.mock);
        assert!(outcome.degraded.is_none());
        assert_eq!(provider.mode(), QuoteMode::Stub);
    }

    #[tokio::test]
    async fn test_live_provider_degrades_to_stub_shape_on_failure() {
        // Unroutable endpoint: the call fails fast and must fall back.
        let provider = LiveQuoteProvider::new(
            "http://127.0.0.1:1/quotes".to_string(),
            "test-key".to_string(),
            Duration::from_millis(500),
        )
        .unwrap();

        let outcome = provider.request_quote(&payload(2)).await;
        assert!(outcome.quote.mock);
        assert!(outcome.degraded.is_some());
        assert!(outcome.quote.notes.contains("stub pricing substituted"));
        assert_eq!(provider.mode(), QuoteMode::Live);
    }
}
