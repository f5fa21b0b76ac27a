//! Token-rotating fetch over a pool of bearer credentials.
//!
//! Candidates are tried in the order the [`TokenSource`] returns them. A
//! candidate rejected by the upstream is discarded from the pool (the
//! fallback token is never discarded) and the next one is tried within the
//! same fetch. Any other failure ends the fetch immediately.

use async_trait::async_trait;
use feedscan_core::{fingerprint, Credential, CredentialId};

use crate::error::FetchError;
use crate::types::FeedBatch;

/// One authenticated request against the feed.
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn fetch_with_token(&self, token: &str, limit: u32) -> Result<FeedBatch, FetchError>;
}

/// Ordered bearer-token candidates plus the ability to drop rejected ones.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn list_valid(&self) -> Result<Vec<Credential>, FetchError>;

    async fn discard(&self, id: i64) -> Result<(), FetchError>;
}

/// What the scan scheduler fetches from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, limit: u32) -> Result<FeedBatch, FetchError>;
}

pub struct TokenRotatingFetcher<A, T> {
    api: A,
    tokens: T,
}

impl<A, T> TokenRotatingFetcher<A, T>
where
    A: FeedApi,
    T: TokenSource,
{
    pub fn new(api: A, tokens: T) -> Self {
        Self { api, tokens }
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    async fn discard_rejected(&self, candidate: &Credential) {
        let CredentialId::Stored(id) = candidate.id else {
            tracing::warn!("fallback token was rejected by upstream");
            return;
        };
        match self.tokens.discard(id).await {
            Ok(()) => tracing::warn!(
                id,
                fingerprint = %fingerprint(&candidate.token),
                "removed rejected token, trying next"
            ),
            Err(e) => tracing::error!(id, error = %e, "failed to remove rejected token"),
        }
    }
}

#[async_trait]
impl<A, T> FeedSource for TokenRotatingFetcher<A, T>
where
    A: FeedApi,
    T: TokenSource,
{
    async fn fetch(&self, limit: u32) -> Result<FeedBatch, FetchError> {
        let candidates = self.tokens.list_valid().await?;
        if candidates.is_empty() {
            return Err(FetchError::NoTokensAvailable);
        }

        let mut last_error = None;
        for candidate in &candidates {
            match self.api.fetch_with_token(&candidate.token, limit).await {
                Ok(batch) => return Ok(batch),
                Err(e) if e.is_auth_failure() => {
                    tracing::debug!(id = %candidate.id, error = %e, "credential rejected");
                    self.discard_rejected(candidate).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(FetchError::NoTokensAvailable))
    }
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod tests;
