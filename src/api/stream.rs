//! Realtime endpoints: the donation insert stream and the live dashboard.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::broadcast;

use super::{success, ApiResult};
use crate::aggregate::Totals;
use crate::AppState;

/// GET /api/donations/stream - Server-Sent Events feed of donation inserts.
///
/// Each event carries the full inserted row. A subscriber that lags receives
/// a `lagged` event and should re-snapshot via the totals endpoint before
/// continuing, mirroring the server-side dashboard.
pub async fn stream_donations(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.feed.subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(donation) => match Event::default().event("donation").json_data(&donation) {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(e) => {
                        tracing::warn!("Failed to serialize donation event: {}", e);
                        continue;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    let event = Event::default().event("lagged").data(missed.to_string());
                    return Some((Ok(event), rx));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/dashboard - Server-resident live aggregate.
pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Totals> {
    success(state.dashboard.totals().await)
}
