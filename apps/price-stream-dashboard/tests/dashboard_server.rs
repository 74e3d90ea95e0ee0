//! Dashboard Server Integration Tests
//!
//! Serves the dashboard router on a local port, feeds it from a mock HTTP
//! price endpoint and talks to it over real sockets.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use price_stream_dashboard::infrastructure::server::router;
use price_stream_dashboard::{
    ChartBoard, DashboardServerState, HttpDataSource, MergePolicy, ViewController,
};

const FEED_BODY: &str = r#"[
    {"stock": "ABC", "timestamp": "2019-02-01 14:30:03.123",
     "top_ask": {"price": 120.48, "size": 109}, "top_bid": {"price": 118.27, "size": 88}},
    {"stock": "DEF", "timestamp": "2019-02-01 14:30:03.123",
     "top_ask": {"price": 117.87, "size": 81}, "top_bid": null}
]"#;

struct TestDashboard {
    base_url: String,
    client: reqwest::Client,
    _feed: MockServer,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for TestDashboard {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn setup_dashboard(feed_response: ResponseTemplate) -> TestDashboard {
    let feed = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(feed_response)
        .mount(&feed)
        .await;

    let source = HttpDataSource::new(feed.uri(), Duration::from_secs(1)).unwrap();
    let board = ChartBoard::new();
    let controller = ViewController::new(
        Arc::new(source),
        Arc::new(board.clone()),
        Duration::from_millis(50),
        MergePolicy::PairwiseAverage,
    );
    let state = Arc::new(DashboardServerState::new(
        "test-0.0.1".to_string(),
        Arc::new(Mutex::new(controller)),
        board,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestDashboard {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        _feed: feed,
        server,
    }
}

impl TestDashboard {
    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn start(&self) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}/stream/start", self.base_url))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    /// Poll `/chart` until it has `rows` rows or the deadline passes.
    async fn wait_for_rows(&self, rows: usize) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (status, body) = self.get("/chart").await;
            if status == 200 && body["rows"].as_array().is_some_and(|r| r.len() == rows) {
                return body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "chart never reached {rows} rows: {body}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[tokio::test]
async fn chart_is_hidden_until_started() {
    let dashboard = setup_dashboard(ResponseTemplate::new(200).set_body_string("[]")).await;

    let (status, _) = dashboard.get("/chart").await;
    assert_eq!(status, 404);

    let (status, health) = dashboard.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["version"], "test-0.0.1");
    assert_eq!(health["stream"]["state"], "idle");
    assert_eq!(health["stream"]["chart_mounted"], false);
}

#[tokio::test]
async fn start_streams_feed_into_chart() {
    let dashboard = setup_dashboard(ResponseTemplate::new(200).set_body_string(FEED_BODY)).await;

    let (status, body) = dashboard.start().await;
    assert_eq!(status, 202);
    assert_eq!(body["state"], "polling");
    assert_eq!(body["interval_ms"], 50);

    let chart = dashboard.wait_for_rows(2).await;
    let rows = chart["rows"].as_array().unwrap();
    assert_eq!(rows[0]["stock"], "ABC");
    assert_eq!(rows[1]["stock"], "DEF");
    assert_eq!(rows[1]["top_bid_price"], 0.0);
    assert_eq!(chart["config"]["view"], "y_line");
}

#[tokio::test]
async fn failing_feed_keeps_polling() {
    let dashboard = setup_dashboard(ResponseTemplate::new(503)).await;
    dashboard.start().await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let (_, health) = dashboard.get("/health").await;
    assert_eq!(health["stream"]["state"], "polling");
    assert!(health["stream"]["stats"]["failed_pulls"].as_u64().unwrap() >= 1);

    let chart = dashboard.wait_for_rows(0).await;
    assert_eq!(chart["updates"], 0);
}

#[tokio::test]
async fn liveness_returns_ok() {
    let dashboard = setup_dashboard(ResponseTemplate::new(200).set_body_string("[]")).await;
    let response = dashboard
        .client
        .get(format!("{}/healthz", dashboard.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}
