//! Integration tests for the storefront backend.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::aggregate::LiveDashboard;
use crate::automation;
use crate::config::{Config, DEFAULT_PRESSMASTER_URL};
use crate::db::{init_database, Repository};
use crate::feed::DonationFeed;
use crate::quotes::QuoteService;
use crate::{create_router, AppState};

/// How long tests wait for the feed-driven workers to catch up.
const WORKER_SETTLE: Duration = Duration::from_millis(500);

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    pool: sqlx::SqlitePool,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool.clone()));

        // Stub quote mode: no upstream credential configured
        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            pressmaster_api_key: None,
            pressmaster_url: DEFAULT_PRESSMASTER_URL.to_string(),
            quote_timeout: Duration::from_secs(10),
        };

        let feed = DonationFeed::new();
        let quotes =
            Arc::new(QuoteService::from_config(&config, repo.clone()).expect("Failed to init quotes"));
        let dashboard = Arc::new(LiveDashboard::spawn(repo.clone(), feed.clone()));
        let _check_drop_worker =
            automation::spawn_check_drop_worker(&feed, quotes.clone(), repo.clone());

        let state = AppState {
            repo,
            feed,
            dashboard,
            quotes,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            pool,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create_donation(
        &self,
        donor: &str,
        amount: f64,
        cause: &str,
        user_id: Option<&str>,
    ) -> Value {
        let mut body = json!({
            "donorName": donor,
            "amount": amount,
            "cause": cause,
            "paymentMethod": "credit_card",
        });
        if let Some(user_id) = user_id {
            body["userId"] = json!(user_id);
        }

        let resp = self
            .client
            .post(self.url("/api/donations"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        body["data"].clone()
    }

    async fn get_json(&self, path: &str) -> Value {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // Request without API key
    let client = Client::new();
    let resp = client
        .get(format!("{}/api/donations", fixture.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_bearer_token_accepted() {
    let fixture = TestFixture::new().await;

    let client = Client::new();
    let resp = client
        .get(format!("{}/api/donations", fixture.base_url))
        .header("Authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_create_and_list_donations() {
    let fixture = TestFixture::new().await;

    fixture
        .create_donation("Ada", 50.0, "education", Some("user-1"))
        .await;
    fixture.create_donation("Grace", 30.0, "healthcare", None).await;

    let body = fixture.get_json("/api/donations").await;
    let donations = body["data"].as_array().unwrap();
    assert_eq!(donations.len(), 2);

    // Filter by cause
    let body = fixture.get_json("/api/donations?cause=education").await;
    let donations = body["data"].as_array().unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0]["donorName"], "Ada");
    assert_eq!(donations[0]["cause"], "education");

    // Filter by user
    let body = fixture.get_json("/api/donations?userId=user-1").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_donation_validation_rejects_bad_input() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/donations"))
        .json(&json!({
            "donorName": "",
            "amount": 0,
            "cause": "",
            "paymentMethod": "paypal",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let details = body["error"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 3);

    // Nothing was persisted
    let body = fixture.get_json("/api/donations").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_donation_totals_end_to_end() {
    let fixture = TestFixture::new().await;

    fixture.create_donation("Ada", 50.0, "education", None).await;
    fixture
        .create_donation("Grace", 30.0, "healthcare", None)
        .await;
    fixture.create_donation("Edith", 20.0, "education", None).await;

    let body = fixture.get_json("/api/donations/totals").await;
    let totals = &body["data"];
    assert_eq!(totals["total"].as_f64().unwrap(), 100.0);
    assert_eq!(totals["byCause"]["education"].as_f64().unwrap(), 70.0);
    assert_eq!(totals["byCause"]["healthcare"].as_f64().unwrap(), 30.0);
    assert_eq!(totals["count"].as_u64().unwrap(), 3);

    // Fresh donations land in every time window
    assert_eq!(totals["lastMinute"].as_f64().unwrap(), 100.0);
    assert_eq!(totals["lastSevenDays"].as_f64().unwrap(), 100.0);

    // Scoped to one cause
    let body = fixture.get_json("/api/donations/totals?cause=education").await;
    assert_eq!(body["data"]["total"].as_f64().unwrap(), 70.0);
}

#[tokio::test]
async fn test_donation_totals_empty_dataset() {
    let fixture = TestFixture::new().await;

    let body = fixture.get_json("/api/donations/totals").await;
    let totals = &body["data"];
    assert_eq!(totals["total"].as_f64().unwrap(), 0.0);
    assert_eq!(totals["count"].as_u64().unwrap(), 0);
    assert!(totals["byCause"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_donation_totals_idempotent() {
    let fixture = TestFixture::new().await;

    fixture.create_donation("Ada", 42.5, "education", None).await;

    let first = fixture.get_json("/api/donations/totals").await;
    let second = fixture.get_json("/api/donations/totals").await;
    // Same fixed dataset, same output; only the windows depend on "now" and
    // both calls are well inside every window.
    assert_eq!(first["data"], second["data"]);
}

#[tokio::test]
async fn test_create_cause_and_reject_duplicate() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/causes"))
        .json(&json!({
            "name": "education",
            "description": "Scholarships and school supplies",
            "tags": ["schools", "students"],
            "websiteUrl": "https://example.org/education",
            "createdBy": "user-1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = fixture.get_json("/api/causes").await;
    let causes = body["data"].as_array().unwrap();
    assert_eq!(causes.len(), 1);
    assert_eq!(causes[0]["name"], "education");
    assert_eq!(causes[0]["tags"][0], "schools");

    // Duplicate name is rejected
    let resp = fixture
        .client
        .post(fixture.url("/api/causes"))
        .json(&json!({
            "name": "education",
            "description": "Another education cause",
            "createdBy": "user-2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_cause_stats() {
    let fixture = TestFixture::new().await;

    for (name, description) in [("education", "Schools"), ("environment", "Trees")] {
        let resp = fixture
            .client
            .post(fixture.url("/api/causes"))
            .json(&json!({
                "name": name,
                "description": description,
                "createdBy": "user-1",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    fixture
        .create_donation("Ada", 60.0, "education", Some("user-1"))
        .await;
    fixture
        .create_donation("Ada", 30.0, "education", Some("user-1"))
        .await;
    fixture.create_donation("Grace", 30.0, "education", None).await;

    let body = fixture.get_json("/api/causes/stats").await;
    let stats = body["data"].as_array().unwrap();
    assert_eq!(stats.len(), 2);

    let education = stats
        .iter()
        .find(|s| s["name"] == "education")
        .expect("education stats");
    assert_eq!(education["totalRaised"].as_f64().unwrap(), 120.0);
    assert_eq!(education["donationCount"].as_u64().unwrap(), 3);
    assert_eq!(education["uniqueDonors"].as_u64().unwrap(), 2);
    assert_eq!(education["avgDonation"].as_f64().unwrap(), 40.0);

    let environment = stats
        .iter()
        .find(|s| s["name"] == "environment")
        .expect("environment stats");
    assert_eq!(environment["totalRaised"].as_f64().unwrap(), 0.0);
    assert_eq!(environment["donationCount"].as_u64().unwrap(), 0);
}

fn order_request(donation_amount: f64) -> Value {
    json!({
        "userId": "user-1",
        "paymentMethod": "credit_card",
        "shipping": {
            "name": "Ada Lovelace",
            "line1": "123 Main St",
            "city": "New York",
            "state": "NY",
            "postalCode": "10001",
            "country": "US",
        },
        "items": [
            {
                "productId": 1,
                "productName": "Organic Tee",
                "size": "M",
                "quantity": 2,
                "price": 25.0,
                "donationAmount": donation_amount,
            }
        ],
        "donationCause": "education",
    })
}

#[tokio::test]
async fn test_create_order_records_donation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/orders"))
        .json(&order_request(15.0))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let order = &body["data"];

    assert_eq!(order["subtotal"].as_f64().unwrap(), 50.0);
    assert_eq!(order["totalDonation"].as_f64().unwrap(), 15.0);
    assert_eq!(order["total"].as_f64().unwrap(), 65.0);
    assert_eq!(order["status"], "pending");
    assert!(order["orderNumber"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    // Fetch it back with items
    let order_id = order["id"].as_str().unwrap();
    let body = fixture.get_json(&format!("/api/orders/{}", order_id)).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    // The order's donation is a donation row attributed to the cause
    let body = fixture.get_json("/api/donations?cause=education").await;
    let donations = body["data"].as_array().unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0]["amount"].as_f64().unwrap(), 15.0);
    assert_eq!(donations[0]["donorName"], "Ada Lovelace");

    // And it is visible to the aggregation view
    let body = fixture.get_json("/api/donations/totals").await;
    assert_eq!(body["data"]["byCause"]["education"].as_f64().unwrap(), 15.0);

    // Order history for the user
    let body = fixture.get_json("/api/orders?userId=user-1").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_order_without_donation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/orders"))
        .json(&order_request(0.0))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // No donation row is written for a donation-free order
    let body = fixture.get_json("/api/donations").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_order_validation_rejects_empty_items() {
    let fixture = TestFixture::new().await;

    let mut request = order_request(0.0);
    request["items"] = json!([]);

    let resp = fixture
        .client
        .post(fixture.url("/api/orders"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Nothing was persisted
    let body = fixture.get_json("/api/orders").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_missing_order_is_404() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/orders/no-such-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_quote_stub_mode() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/quotes"))
        .header("x-user-id", "user-1")
        .json(&json!({
            "project": "Print Power Purpose",
            "specs": "Recycled paper, two-color print",
            "quantity": 10,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let quote = &body["data"];

    // No upstream credential configured: always a stub quote
    assert_eq!(quote["mock"], true);
    assert_eq!(quote["quote"]["currency"], "USD");
    assert!(quote["quote"]["amount"].as_f64().unwrap() > 0.0);

    // Exactly one audit row, with the resolved mode and terminal status
    let body = fixture.get_json("/api/quotes/requests").await;
    let requests = body["data"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["mode"], "stub");
    assert_eq!(requests[0]["status"], "success");
    assert_eq!(requests[0]["userId"], "user-1");
    assert_eq!(requests[0]["type"], "quote");
}

#[tokio::test]
async fn test_quote_validation_enumerates_fields() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/quotes"))
        .json(&json!({
            "project": "",
            "specs": "",
            "quantity": 0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["message"], "Invalid input");
    let details = body["error"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 3);

    // Rejected before any side effect: no audit row
    let body = fixture.get_json("/api/quotes/requests").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_check_drop_triggers_at_threshold() {
    let fixture = TestFixture::new().await;

    let donation = fixture
        .create_donation("Big Donor", 777.0, "education", Some("user-1"))
        .await;
    let donation_id = donation["id"].as_str().unwrap();

    tokio::time::sleep(WORKER_SETTLE).await;

    // The automation requested a quote through the audited service path
    let body = fixture.get_json("/api/quotes/requests").await;
    let requests = body["data"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["donationId"], donation_id);
    assert_eq!(requests[0]["mode"], "stub");
    assert_eq!(requests[0]["status"], "success");
    assert_eq!(requests[0]["requestBody"]["project"], "Print Power Purpose");

    // The donor got a dismissible notification
    let body = fixture.get_json("/api/notifications?userId=user-1").await;
    let notifications = body["data"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "check_drop");
    assert!(notifications[0]["readAt"].is_null());

    // Mark it read
    let notification_id = notifications[0]["id"].as_str().unwrap();
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/notifications/{}/read", notification_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["readAt"].is_string());

    // The donation itself is durable regardless of automation outcome
    let body = fixture.get_json("/api/donations").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_check_drop_not_triggered_below_threshold() {
    let fixture = TestFixture::new().await;

    fixture
        .create_donation("Almost", 776.99, "education", Some("user-1"))
        .await;

    tokio::time::sleep(WORKER_SETTLE).await;

    let body = fixture.get_json("/api/quotes/requests").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let body = fixture.get_json("/api/notifications?userId=user-1").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_check_drop_triggers_for_order_donation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/orders"))
        .json(&order_request(800.0))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    tokio::time::sleep(WORKER_SETTLE).await;

    let body = fixture.get_json("/api/quotes/requests").await;
    let requests = body["data"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["status"], "success");
}

#[tokio::test]
async fn test_live_dashboard_tracks_feed() {
    let fixture = TestFixture::new().await;

    let body = fixture.get_json("/api/dashboard").await;
    assert_eq!(body["data"]["total"].as_f64().unwrap(), 0.0);

    fixture.create_donation("Ada", 50.0, "education", None).await;
    fixture.create_donation("Grace", 25.0, "education", None).await;

    tokio::time::sleep(WORKER_SETTLE).await;

    let body = fixture.get_json("/api/dashboard").await;
    let totals = &body["data"];
    assert_eq!(totals["total"].as_f64().unwrap(), 75.0);
    assert_eq!(totals["byCause"]["education"].as_f64().unwrap(), 75.0);
    assert_eq!(totals["count"].as_u64().unwrap(), 2);
}

#[tokio::test]
async fn test_malformed_amount_is_rejected_not_zeroed() {
    let fixture = TestFixture::new().await;

    fixture.create_donation("Ada", 50.0, "education", None).await;

    // Corrupt a row behind the repository's back
    sqlx::query(
        "INSERT INTO donations (id, donor_name, amount, cause, payment_method, created_at, user_id) VALUES ('bad', 'Mallory', 'not-a-number', 'education', 'paypal', '2024-01-01T00:00:00+00:00', NULL)"
    )
    .execute(&fixture.pool)
    .await
    .unwrap();

    // The aggregation view surfaces the malformed row as an error instead of
    // silently folding it into the totals as zero
    let resp = fixture
        .client
        .get(fixture.url("/api/donations/totals"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");
}

#[tokio::test]
async fn test_donation_stream_delivers_inserts() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/donations/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    fixture.create_donation("Ada", 12.5, "education", None).await;

    // Read chunks until the donation event arrives
    let mut resp = resp;
    let mut received = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !received.contains("event: donation") {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let chunk = tokio::time::timeout(remaining, resp.chunk())
            .await
            .expect("timed out waiting for donation event")
            .unwrap()
            .expect("stream ended before donation event");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }

    assert!(received.contains("event: donation"));
    assert!(received.contains("\"donorName\":\"Ada\""));
}
