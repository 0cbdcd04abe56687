//! Admin server integration tests
//!
//! Each test serves the router on an ephemeral port and talks to it over HTTP.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use cfmirror::cache::CacheSystem;
use cfmirror::config::CacheConfig;
use cfmirror::events::EventSystem;
use cfmirror::metrics;
use cfmirror::server::{AdminServer, AppState};

use crate::common::{finished_contest, now, rating_change, store, MockApi};

struct TestServer {
    base: String,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(caches: Arc<CacheSystem>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let server = AdminServer::new(addr, AppState::new(caches));
        let token = shutdown.clone();
        tokio::spawn(async move {
            server
                .serve(listener, async move { token.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            shutdown,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(format!("{}{path}", self.base)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str) -> (u16, Value) {
        let response = self.client.post(format!("{}{path}", self.base)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn caches(api: &Arc<MockApi>) -> Arc<CacheSystem> {
    api.set_contests(vec![finished_contest(7, "Codeforces Round 7", 2 * 86_400)]);
    api.set_rating_changes(7, vec![rating_change(7, "alice", 1500, 1550, now())]);
    let caches = Arc::new(CacheSystem::new(
        api.clone(),
        store(),
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    ));
    caches.contest.reload_now().await.unwrap();
    caches
}

#[tokio::test]
async fn test_health_and_contest_lookup() {
    let api = MockApi::new();
    let server = TestServer::start(caches(&api).await).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["contests"], 1);

    let (status, body) = server.get("/contests/7").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], 7);
    assert_eq!(body["data"]["phase"], "FINISHED");

    let (status, body) = server.get("/contests/999").await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["category"], "data");

    let (status, _) = server.get("/ranklist/7").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_manual_triggers() {
    let api = MockApi::new();
    let server = TestServer::start(caches(&api).await).await;

    let (status, body) = server.post("/cache/ratingchanges/7").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["saved"], 1);

    let (status, body) = server.post("/cache/ratingchanges/missing").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["saved"], 0);

    let (status, _) = server.post("/cache/ratingchanges/latest").await;
    assert_eq!(status, 400);

    let (status, _) = server.post("/cache/problemsets/missing").await;
    assert_eq!(status, 400);

    let (status, body) = server.post("/cache/contests/reload").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    api.fail_contest_list(true);
    let (status, body) = server.post("/cache/contests/reload").await;
    assert_eq!(status, 502);
    assert_eq!(body["category"], "network");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    metrics::init_metrics().unwrap();
    let api = MockApi::new();
    let caches = caches(&api).await;
    let server = TestServer::start(caches).await;

    let response = reqwest::get(format!("{}/metrics", server.base)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("cfmirror_cache_refreshes_total"));
}
