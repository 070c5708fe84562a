//! Check-drop automation.
//!
//! A worker task consumes the donation feed and requests a Pressmaster quote
//! whenever a donation reaches the $777 threshold. The worker runs after the
//! primary write commits, so quote failures can never roll back or block a
//! donation or order.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::db::Repository;
use crate::feed::DonationFeed;
use crate::models::{Donation, QuotePayload};
use crate::quotes::QuoteService;

/// Donation amount, in dollars, at which the check-drop fires.
pub const CHECK_DROP_THRESHOLD_DOLLARS: i64 = 777;

/// Whether a donation amount qualifies for the check-drop.
pub fn is_check_drop(amount: Decimal) -> bool {
    amount >= Decimal::from(CHECK_DROP_THRESHOLD_DOLLARS)
}

/// Spawn the check-drop worker. Runs until the feed closes.
pub fn spawn_check_drop_worker(
    feed: &DonationFeed,
    quotes: Arc<QuoteService>,
    repo: Arc<Repository>,
) -> JoinHandle<()> {
    let mut rx = feed.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(donation) => {
                    if is_check_drop(donation.amount) {
                        handle_check_drop(&quotes, &repo, &donation).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Check-drop worker lagged by {} donation events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Donation feed closed; check-drop worker exiting");
                    break;
                }
            }
        }
    })
}

/// Request a quote for one qualifying donation and surface the result as a
/// notification. Failures are logged and contained; the donation itself is
/// already durable.
async fn handle_check_drop(quotes: &QuoteService, repo: &Repository, donation: &Donation) {
    let payload = QuotePayload {
        project: "Print Power Purpose".to_string(),
        specs: "Check-drop campaign assets".to_string(),
        quantity: 1,
        donation_id: Some(donation.id.clone()),
    };

    match quotes.request(donation.user_id.as_deref(), &payload).await {
        Ok(quote) => {
            tracing::info!(
                donation = %donation.id,
                amount = %donation.amount,
                mock = quote.mock,
                "Check-drop quote ready"
            );

            if let Some(user_id) = &donation.user_id {
                let body = format!(
                    "Pressmaster ({}) quote ready: ${:.2} {}, {}",
                    if quote.mock { "Stub" } else { "Live" },
                    quote.quote.amount,
                    quote.quote.currency,
                    quote.turnaround
                );
                if let Err(e) = repo
                    .create_notification(user_id, "check_drop", "$777 Check Drop triggered!", &body)
                    .await
                {
                    tracing::warn!("Failed to record check-drop notification: {}", e);
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                donation = %donation.id,
                "Check-drop quote failed (non-blocking): {}",
                e
            );
        }
    }
}
