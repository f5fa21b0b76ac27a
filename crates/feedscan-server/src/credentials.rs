use async_trait::async_trait;
use feedscan_core::Credential;
use feedscan_db::TokenStore;
use feedscan_feed::{FetchError, TokenSource};

/// [`TokenSource`] over the persisted pool.
///
/// A rejected token is deleted outright so it never comes back in later scans.
#[derive(Clone)]
pub struct PgTokenSource {
    store: TokenStore,
}

impl PgTokenSource {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenSource for PgTokenSource {
    async fn list_valid(&self) -> Result<Vec<Credential>, FetchError> {
        self.store
            .list_valid()
            .await
            .map_err(|e| FetchError::TokenStore(e.to_string()))
    }

    async fn discard(&self, id: i64) -> Result<(), FetchError> {
        self.store
            .remove(id)
            .await
            .map(|_| ())
            .map_err(|e| FetchError::TokenStore(e.to_string()))
    }
}
