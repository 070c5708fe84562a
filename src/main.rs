//! Print Power Purpose Backend
//!
//! REST backend for a purpose-driven storefront: donation tracking with a
//! realtime change feed, live aggregation dashboards, checkout, and the
//! Pressmaster quote automation.

mod aggregate;
mod api;
mod auth;
mod automation;
mod config;
mod db;
mod errors;
mod feed;
mod models;
mod quotes;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aggregate::LiveDashboard;
use config::Config;
use db::Repository;
use feed::DonationFeed;
use quotes::QuoteService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub feed: DonationFeed,
    pub dashboard: Arc<LiveDashboard>,
    pub quotes: Arc<QuoteService>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Print Power Purpose Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (PPP_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Change feed and quote service
    let feed = DonationFeed::new();
    let quotes = Arc::new(QuoteService::from_config(&config, repo.clone())?);
    tracing::info!("Pressmaster quote mode: {}", quotes.mode().as_str());

    // Live dashboard aggregate and check-drop automation
    let dashboard = Arc::new(LiveDashboard::spawn(repo.clone(), feed.clone()));
    let _check_drop_worker =
        automation::spawn_check_drop_worker(&feed, quotes.clone(), repo.clone());

    // Create application state
    let state = AppState {
        repo,
        feed,
        dashboard,
        quotes,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Donations
        .route("/donations", get(api::list_donations))
        .route("/donations", post(api::create_donation))
        .route("/donations/totals", get(api::donation_totals))
        .route("/donations/stream", get(api::stream_donations))
        // Live dashboard
        .route("/dashboard", get(api::get_dashboard))
        // Causes
        .route("/causes", get(api::list_causes))
        .route("/causes", post(api::create_cause))
        .route("/causes/stats", get(api::cause_stats))
        // Orders
        .route("/orders", get(api::list_orders))
        .route("/orders", post(api::create_order))
        .route("/orders/{id}", get(api::get_order))
        // Pressmaster quotes
        .route("/quotes", post(api::request_quote))
        .route("/quotes/requests", get(api::list_quote_requests))
        // Notifications
        .route("/notifications", get(api::list_notifications))
        .route("/notifications/{id}/read", post(api::mark_notification_read))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
