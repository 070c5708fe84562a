//! In-process change feed for donation inserts.
//!
//! A broadcast channel delivers every durable donation row, in commit order,
//! to the live dashboard, the check-drop automation, and any number of SSE
//! subscribers. Publishing happens strictly after the insert commits.

use tokio::sync::broadcast;

use crate::models::Donation;

/// Buffered events per subscriber; a subscriber that falls further behind
/// lags and must re-snapshot.
const FEED_CAPACITY: usize = 256;

/// Handle to the donation insert feed. Cheap to clone.
#[derive(Clone)]
pub struct DonationFeed {
    tx: broadcast::Sender<Donation>,
}

impl DonationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Publish one donation insert. Call only after the row is durable.
    pub fn publish(&self, donation: &Donation) {
        let subscribers = self.tx.send(donation.clone()).unwrap_or(0);
        tracing::debug!(
            donation = %donation.id,
            subscribers,
            "Published donation event"
        );
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Donation> {
        self.tx.subscribe()
    }
}

impl Default for DonationFeed {
    fn default() -> Self {
        Self::new()
    }
}
