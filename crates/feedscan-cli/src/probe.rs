//! One-off feed probe.
//!
//! Runs a single token-rotating fetch and reports what came back without
//! writing posts. Unlike the server's token source, rejected tokens are
//! reported rather than deleted.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use feedscan_core::{Credential, NewPost};
use feedscan_db::TokenStore;
use feedscan_feed::{
    normalize_items, FeedClient, FeedSource, FetchError, TokenRotatingFetcher, TokenSource,
};

/// Read-only [`TokenSource`]: `discard` only remembers the id.
pub(crate) struct ProbeTokens {
    store: TokenStore,
    rejected: Mutex<Vec<i64>>,
}

impl ProbeTokens {
    pub(crate) fn new(store: TokenStore) -> Self {
        Self {
            store,
            rejected: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn rejected(&self) -> Vec<i64> {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TokenSource for ProbeTokens {
    async fn list_valid(&self) -> Result<Vec<Credential>, FetchError> {
        self.store
            .list_valid()
            .await
            .map_err(|e| FetchError::TokenStore(e.to_string()))
    }

    async fn discard(&self, id: i64) -> Result<(), FetchError> {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ProbeReport {
    pub fetched: usize,
    pub already_stored: usize,
    pub orientations: BTreeMap<&'static str, usize>,
    pub rejected_tokens: Vec<i64>,
    pub cursor: Option<String>,
}

impl ProbeReport {
    pub(crate) fn new(posts: &[NewPost], already_stored: usize) -> Self {
        let mut orientations = BTreeMap::new();
        for post in posts {
            *orientations.entry(post.orientation.as_str()).or_insert(0) += 1;
        }
        Self {
            fetched: posts.len(),
            already_stored,
            orientations,
            ..Self::default()
        }
    }

    pub(crate) fn render(&self) -> String {
        let mut out = format!(
            "fetched {} item(s): {} new, {} already stored\n",
            self.fetched,
            self.fetched.saturating_sub(self.already_stored),
            self.already_stored
        );
        for (orientation, count) in &self.orientations {
            out.push_str(&format!("  {orientation:<8}{count}\n"));
        }
        if !self.rejected_tokens.is_empty() {
            let ids: Vec<String> = self.rejected_tokens.iter().map(i64::to_string).collect();
            out.push_str(&format!(
                "rejected token id(s): {} (left in the pool)\n",
                ids.join(", ")
            ));
        }
        if let Some(cursor) = &self.cursor {
            out.push_str(&format!("next cursor: {cursor}\n"));
        }
        out
    }
}

/// Fetch one page and print a [`ProbeReport`].
///
/// # Errors
///
/// Returns an error if the feed client cannot be built, every candidate
/// token is rejected, the fetch fails, or a lookup against `posts` fails.
pub(crate) async fn run_probe(
    pool: &sqlx::PgPool,
    config: &feedscan_core::AppConfig,
    store: TokenStore,
    limit: u32,
) -> anyhow::Result<()> {
    let fetcher = TokenRotatingFetcher::new(
        FeedClient::from_app_config(config)?,
        ProbeTokens::new(store),
    );

    tracing::debug!(limit, "probing feed");
    let batch = fetcher.fetch(limit).await?;
    let posts = normalize_items(&batch.items, Utc::now());

    let mut already_stored = 0;
    for post in &posts {
        if feedscan_db::post_exists(pool, &post.id).await? {
            already_stored += 1;
        }
    }

    let mut report = ProbeReport::new(&posts, already_stored);
    report.rejected_tokens = fetcher.tokens().rejected();
    report.cursor = batch.cursor;
    print!("{}", report.render());
    Ok(())
}
