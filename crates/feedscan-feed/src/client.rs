//! HTTP client for the upstream feed endpoint.

use std::time::Duration;

use async_trait::async_trait;
use feedscan_core::AppConfig;
use reqwest::{Client, StatusCode};

use crate::error::FetchError;
use crate::rotation::FeedApi;
use crate::types::{FeedBatch, FeedResponse};

pub const DEFAULT_CUT: &str = "nf2_latest";

/// HTTP client for the feed's list endpoint.
///
/// One request per call; no retries. Credential rejection (401/403, or an
/// error envelope naming the token) is reported as a typed error so the
/// rotating fetcher can move on to the next candidate.
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    feed_url: String,
    cut: String,
    accept_language: Option<String>,
    cookie: Option<String>,
}

impl FeedClient {
    /// Creates a `FeedClient` with the given request timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(feed_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Transport)?;
        Ok(Self {
            client,
            feed_url: feed_url.to_owned(),
            cut: DEFAULT_CUT.to_owned(),
            accept_language: None,
            cookie: None,
        })
    }

    /// Builds a client from the feed section of [`AppConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, FetchError> {
        let client = Self::new(&config.feed_url, config.feed_timeout_secs, &config.user_agent)?
            .with_cut(&config.feed_cut)
            .with_accept_language(&config.accept_language);
        Ok(match config.feed_cookie.as_deref() {
            Some(cookie) => client.with_cookie(cookie),
            None => client,
        })
    }

    #[must_use]
    pub fn with_cut(mut self, cut: &str) -> Self {
        cut.clone_into(&mut self.cut);
        self
    }

    #[must_use]
    pub fn with_accept_language(mut self, accept_language: &str) -> Self {
        self.accept_language = Some(accept_language.to_owned()).filter(|v| !v.is_empty());
        self
    }

    /// Raw `Cookie` header value sent with every request.
    #[must_use]
    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_owned()).filter(|v| !v.is_empty());
        self
    }

    /// Fetches one page of the feed using `token` as the bearer credential.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Unauthorized`] on HTTP 401 or 403.
    /// - [`FetchError::Upstream`] on any other non-2xx status without an error envelope.
    /// - [`FetchError::InvalidResponse`] when the body is not JSON, carries an
    ///   `error` envelope, or has no `items` array.
    /// - [`FetchError::Timeout`] / [`FetchError::Transport`] on network failure.
    pub async fn fetch_page(&self, token: &str, limit: u32) -> Result<FeedBatch, FetchError> {
        let url = self.request_url(limit)?;

        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(token);
        if let Some(lang) = &self.accept_language {
            request = request.header(reqwest::header::ACCEPT_LANGUAGE, lang);
        }
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        classify_body(status, &body)
    }

    /// Builds the list URL with `limit` and `cut` query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidResponse`] if the configured feed URL does
    /// not parse.
    fn request_url(&self, limit: u32) -> Result<reqwest::Url, FetchError> {
        let mut url = reqwest::Url::parse(&self.feed_url).map_err(|e| {
            FetchError::InvalidResponse(format!("feed url \"{}\" is invalid: {e}", self.feed_url))
        })?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("cut", &self.cut);
        Ok(url)
    }
}

/// `null`, `false`, `0` and `""` mean "no error"; anything else is an envelope.
fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

fn classify_body(status: StatusCode, body: &str) -> Result<FeedBatch, FetchError> {
    let parsed = match serde_json::from_str::<FeedResponse>(body) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => {
            return Err(FetchError::Upstream {
                status: status.as_u16(),
            })
        }
        Err(e) => return Err(FetchError::InvalidResponse(format!("parse error: {e}"))),
    };

    if let Some(error) = parsed.error.filter(is_truthy) {
        return Err(FetchError::InvalidResponse(format!("API error: {error}")));
    }

    if !status.is_success() {
        return Err(FetchError::Upstream {
            status: status.as_u16(),
        });
    }

    let items = parsed
        .items
        .ok_or_else(|| FetchError::InvalidResponse("response has no items array".to_owned()))?;

    Ok(FeedBatch {
        items,
        cursor: parsed.cursor,
    })
}

#[async_trait]
impl FeedApi for FeedClient {
    async fn fetch_with_token(&self, token: &str, limit: u32) -> Result<FeedBatch, FetchError> {
        self.fetch_page(token, limit).await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
