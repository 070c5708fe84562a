//! Donation aggregation.
//!
//! Pure snapshot/apply reductions over donation rows, plus the live dashboard
//! controller that keeps a server-resident aggregate in sync with the change
//! feed. Totals are exact decimal sums; rounding is display-only and never
//! carried back into the running values.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::db::Repository;
use crate::feed::DonationFeed;
use crate::models::{Cause, Donation};

/// Running donation sums for one observation point.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total: Decimal,
    pub by_cause: BTreeMap<String, Decimal>,
    pub today: Decimal,
    pub last_seven_days: Decimal,
    pub last_minute: Decimal,
    pub count: u64,
}

/// Reduce a full donation set into totals.
///
/// Window predicates are evaluated against the wall-clock `now` captured by
/// the caller at snapshot time, not re-evaluated continuously.
pub fn snapshot(rows: &[Donation], now: DateTime<Utc>) -> Totals {
    let mut totals = Totals::default();
    for donation in rows {
        apply(&mut totals, donation, now);
    }
    totals
}

/// Add one donation to every matching bucket exactly once.
pub fn apply(totals: &mut Totals, donation: &Donation, now: DateTime<Utc>) {
    totals.total += donation.amount;
    *totals
        .by_cause
        .entry(donation.cause.clone())
        .or_insert(Decimal::ZERO) += donation.amount;
    totals.count += 1;

    let age = now.signed_duration_since(donation.created_at);
    if donation.created_at.date_naive() == now.date_naive() {
        totals.today += donation.amount;
    }
    if age <= chrono::Duration::days(7) {
        totals.last_seven_days += donation.amount;
    }
    if age <= chrono::Duration::seconds(60) {
        totals.last_minute += donation.amount;
    }
}

/// Per-cause rollup for the causes page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseStats {
    pub id: String,
    pub name: String,
    pub description: String,
    pub total_raised: Decimal,
    pub donation_count: u64,
    pub unique_donors: u64,
    pub avg_donation: Decimal,
}

/// Compute per-cause statistics. Donations attribute to causes by name;
/// anonymous donors are distinguished by donor name.
pub fn cause_stats(causes: &[Cause], donations: &[Donation]) -> Vec<CauseStats> {
    causes
        .iter()
        .map(|cause| {
            let mut total = Decimal::ZERO;
            let mut count: u64 = 0;
            let mut donors: HashSet<&str> = HashSet::new();

            for donation in donations.iter().filter(|d| d.cause == cause.name) {
                total += donation.amount;
                count += 1;
                donors.insert(
                    donation
                        .user_id
                        .as_deref()
                        .unwrap_or(donation.donor_name.as_str()),
                );
            }

            let avg_donation = if count > 0 {
                (total / Decimal::from(count)).round_dp(2)
            } else {
                Decimal::ZERO
            };

            CauseStats {
                id: cause.id.clone(),
                name: cause.name.clone(),
                description: cause.description.clone(),
                total_raised: total,
                donation_count: count,
                unique_donors: donors.len() as u64,
                avg_donation,
            }
        })
        .collect()
}

/// Cursor captured at snapshot time for stitching the change feed onto a
/// table scan without double counting.
#[derive(Debug, Default)]
pub struct SnapshotCursor {
    cursor: Option<DateTime<Utc>>,
    seen: HashSet<String>,
}

impl SnapshotCursor {
    pub fn from_rows(rows: &[Donation]) -> Self {
        Self {
            cursor: rows.iter().map(|d| d.created_at).max(),
            seen: rows.iter().map(|d| d.id.clone()).collect(),
        }
    }

    /// Whether a feed event should be applied on top of the snapshot.
    ///
    /// Events timestamped after the cursor are always admitted; events at or
    /// before it are deduplicated by primary key, so an insert that committed
    /// during the snapshot scan is counted exactly once.
    pub fn admit(&mut self, donation: &Donation) -> bool {
        match self.cursor {
            Some(cursor) if donation.created_at <= cursor => {
                self.seen.insert(donation.id.clone())
            }
            _ => true,
        }
    }
}

/// Server-resident live aggregate: subscribes to the donation feed, then
/// snapshots, then applies events, re-snapshotting with backoff whenever the
/// subscription lags or the snapshot fails.
pub struct LiveDashboard {
    totals: Arc<RwLock<Totals>>,
    handle: JoinHandle<()>,
}

impl LiveDashboard {
    pub fn spawn(repo: Arc<Repository>, feed: DonationFeed) -> Self {
        let totals = Arc::new(RwLock::new(Totals::default()));
        let shared = totals.clone();
        let handle = tokio::spawn(async move {
            run_dashboard(repo, feed, shared).await;
        });
        Self { totals, handle }
    }

    /// Current totals as of the last applied event.
    pub async fn totals(&self) -> Totals {
        self.totals.read().await.clone()
    }
}

impl Drop for LiveDashboard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_dashboard(repo: Arc<Repository>, feed: DonationFeed, shared: Arc<RwLock<Totals>>) {
    let mut backoff = Duration::from_secs(1);

    loop {
        // Subscribe before the snapshot so no insert can slip between the
        // table scan and the first received event.
        let mut rx = feed.subscribe();

        let rows = match repo.list_donations(None, None).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Dashboard snapshot failed: {}; retrying in {:?}", e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(60));
                continue;
            }
        };
        backoff = Duration::from_secs(1);

        let mut cursor = SnapshotCursor::from_rows(&rows);
        let mut totals = snapshot(&rows, Utc::now());
        *shared.write().await = totals.clone();
        tracing::debug!(count = totals.count, "Dashboard snapshot complete");

        loop {
            match rx.recv().await {
                Ok(donation) => {
                    if cursor.admit(&donation) {
                        apply(&mut totals, &donation, Utc::now());
                        *shared.write().await = totals.clone();
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Dashboard feed lagged by {} events; re-snapshotting", missed);
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Donation feed closed; dashboard worker exiting");
                    return;
                }
            }
        }
    }
}
