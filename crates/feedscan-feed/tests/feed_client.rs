//! Integration tests for `FeedClient` and `TokenRotatingFetcher`.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test so no
//! real network traffic is made.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use feedscan_core::{Credential, CredentialId};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedscan_feed::{FeedClient, FeedSource, FetchError, TokenRotatingFetcher, TokenSource};

const FEED_PATH: &str = "/backend/project_y/feed";

/// Builds a `FeedClient` pointed at the mock server with a 5-second timeout.
fn test_client(server: &MockServer) -> FeedClient {
    FeedClient::new(&format!("{}{FEED_PATH}", server.uri()), 5, "feedscan-test/0.1")
        .expect("failed to build test FeedClient")
}

fn feed_json(ids: &[&str]) -> serde_json::Value {
    let items: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "post": {
                    "id": id,
                    "text": "prompt",
                    "posted_at": 1_700_000_000.5,
                    "attachments": [{"width": 1080, "height": 1920, "n_frames": 300}]
                }
            })
        })
        .collect();
    json!({ "items": items, "cursor": "next" })
}

struct StaticTokens {
    pool: Mutex<Vec<Credential>>,
}

impl StaticTokens {
    fn new(tokens: &[&str]) -> Self {
        let pool = tokens
            .iter()
            .zip(1_i64..)
            .map(|(token, id)| Credential {
                id: CredentialId::Stored(id),
                token: (*token).to_owned(),
                expires_at: None,
                added_at: None,
            })
            .collect();
        Self {
            pool: Mutex::new(pool),
        }
    }

    fn len(&self) -> usize {
        self.pool.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenSource for StaticTokens {
    async fn list_valid(&self) -> Result<Vec<Credential>, FetchError> {
        Ok(self.pool.lock().unwrap().clone())
    }

    async fn discard(&self, id: i64) -> Result<(), FetchError> {
        self.pool
            .lock()
            .unwrap()
            .retain(|c| c.id != CredentialId::Stored(id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FeedClient
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_page_sends_expected_request_and_parses_items() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .and(query_param("limit", "200"))
        .and(query_param("cut", "nf2_latest"))
        .and(header("authorization", "Bearer tok-1"))
        .and(header("accept", "application/json"))
        .and(header("user-agent", "feedscan-test/0.1"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_json(&["s_1", "s_2"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server).with_cookie("session=abc");
    let batch = client.fetch_page("tok-1", 200).await.expect("fetch failed");

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.ids().collect::<Vec<_>>(), vec!["s_1", "s_2"]);
    assert_eq!(batch.cursor.as_deref(), Some("next"));
    assert_eq!(batch.items[0].post.attachments[0].n_frames, Some(300));
}

#[tokio::test]
async fn fetch_page_maps_401_and_403_to_unauthorized() {
    for status in [401_u16, 403] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let err = test_client(&server).fetch_page("t", 10).await.unwrap_err();
        match err {
            FetchError::Unauthorized { status: got } => assert_eq!(got, status),
            other => panic!("expected Unauthorized, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn fetch_page_maps_server_error_to_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch_page("t", 10).await.unwrap_err();
    assert!(
        matches!(err, FetchError::Upstream { status: 503 }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn fetch_page_rejects_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": {"message": "rate limited"}})),
        )
        .mount(&server)
        .await;

    let err = test_client(&server).fetch_page("t", 10).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidResponse(_)));
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn fetch_page_rejects_missing_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cursor": null})))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch_page("t", 10).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidResponse(_)));
}

#[tokio::test]
async fn fetch_page_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(feed_json(&[]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = FeedClient::new(&format!("{}{FEED_PATH}", server.uri()), 1, "ua").unwrap();
    let err = client.fetch_page("t", 10).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout), "got: {err:?}");
}

// ---------------------------------------------------------------------------
// TokenRotatingFetcher over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rotating_fetcher_skips_rejected_tokens_over_http() {
    let server = MockServer::start().await;

    for bad in ["bad-1", "bad-2"] {
        Mock::given(method("GET"))
            .and(header("authorization", format!("Bearer {bad}").as_str()))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_json(&["a", "b", "c"])))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = TokenRotatingFetcher::new(
        test_client(&server),
        StaticTokens::new(&["bad-1", "bad-2", "good"]),
    );

    let batch = fetcher.fetch(200).await.expect("rotation should succeed");
    assert_eq!(batch.len(), 3);
    assert_eq!(fetcher.tokens().len(), 1);
}

#[tokio::test]
async fn rotating_fetcher_without_tokens_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_json(&["a"])))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = TokenRotatingFetcher::new(test_client(&server), StaticTokens::new(&[]));
    let err = fetcher.fetch(200).await.unwrap_err();
    assert!(matches!(err, FetchError::NoTokensAvailable));
}
