//! Database operations for the `feed_tokens` pool.
//!
//! [`TokenStore`] resolves candidates in two tiers: persisted rows that have
//! not expired, ordered by latest expiry first, and only when that set is
//! empty, the statically configured fallback token.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use feedscan_core::{decode_expiry, fingerprint, validate_new_token, Credential, CredentialId};
use sqlx::PgPool;

use crate::DbError;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// A row from the `feed_tokens` table.
#[derive(Clone, sqlx::FromRow)]
pub struct TokenRow {
    pub id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub added_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRow")
            .field("id", &self.id)
            .field("token", &fingerprint(&self.token))
            .field("expires_at", &self.expires_at)
            .field("added_at", &self.added_at)
            .finish()
    }
}

impl From<TokenRow> for Credential {
    fn from(row: TokenRow) -> Self {
        Credential {
            id: CredentialId::Stored(row.id),
            token: row.token,
            expires_at: Some(row.expires_at),
            added_at: Some(row.added_at),
        }
    }
}

struct CachedTokens {
    loaded_at: Instant,
    rows: Vec<TokenRow>,
}

/// Bumped by every [`TokenStore::invalidate`]; a load that started under an
/// older generation is not cached.
#[derive(Default)]
struct TokenCache {
    generation: u64,
    entry: Option<CachedTokens>,
}

/// Persisted token pool with a short-lived in-process cache of valid rows.
#[derive(Clone)]
pub struct TokenStore {
    pool: PgPool,
    fallback: Option<String>,
    cache: Arc<Mutex<TokenCache>>,
    cache_ttl: Duration,
}

impl TokenStore {
    #[must_use]
    pub fn new(pool: PgPool, fallback: Option<String>) -> Self {
        Self {
            pool,
            fallback,
            cache: Arc::new(Mutex::new(TokenCache::default())),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Override the valid-token cache TTL. `Duration::ZERO` disables caching.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn fallback_token(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Returns the ordered candidate list: persisted valid tokens first, the
    /// configured fallback only when none are stored.
    ///
    /// Expired rows are deleted before the list is read from the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the purge or select fails.
    pub async fn list_valid(&self) -> Result<Vec<Credential>, DbError> {
        let now = Utc::now();
        let rows = match self.cached_rows(now) {
            Some(rows) => rows,
            None => {
                self.purge_expired().await?;
                let generation = self.generation();
                let rows = self.select_valid().await?;
                self.store_cache(rows.clone(), generation);
                rows
            }
        };

        if rows.is_empty() {
            return Ok(self.fallback_candidate(now).into_iter().collect());
        }
        Ok(rows.into_iter().map(Credential::from).collect())
    }

    /// Validates and stores a new token.
    ///
    /// Submitting a token that is already pooled returns the existing row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Token`] if the token cannot be decoded or has
    /// already expired (nothing is written), or [`DbError::Sqlx`] if the
    /// insert fails.
    pub async fn add(&self, raw: &str) -> Result<TokenRow, DbError> {
        let (token, expires_at) = validate_new_token(raw, Utc::now())?;

        let inserted = sqlx::query_as::<_, TokenRow>(
            "INSERT INTO feed_tokens (token, expires_at) VALUES ($1, $2) \
             ON CONFLICT (token) DO NOTHING \
             RETURNING id, token, expires_at, added_at",
        )
        .bind(&token)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        self.invalidate();

        let row = match inserted {
            Some(row) => {
                tracing::info!(
                    id = row.id,
                    fingerprint = %fingerprint(&row.token),
                    expires_at = %row.expires_at,
                    "token added to pool"
                );
                row
            }
            None => sqlx::query_as::<_, TokenRow>(
                "SELECT id, token, expires_at, added_at FROM feed_tokens WHERE token = $1",
            )
            .bind(&token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?,
        };

        Ok(row)
    }

    /// Deletes a token by id. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the delete fails.
    pub async fn remove(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM feed_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.invalidate();
        Ok(result.rows_affected() > 0)
    }

    /// Deletes a token by its value. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the delete fails.
    pub async fn remove_by_value(&self, token: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM feed_tokens WHERE token = $1")
            .bind(token.trim())
            .execute(&self.pool)
            .await?;
        self.invalidate();
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every row whose expiry has passed. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM feed_tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "purged expired tokens");
            self.invalidate();
        }
        Ok(purged)
    }

    /// Drops the cached valid-token list so the next read hits the database.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.generation = cache.generation.wrapping_add(1);
        cache.entry = None;
    }

    fn generation(&self) -> u64 {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    async fn select_valid(&self) -> Result<Vec<TokenRow>, DbError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            "SELECT id, token, expires_at, added_at \
             FROM feed_tokens \
             WHERE expires_at > NOW() \
             ORDER BY expires_at DESC, added_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    fn cached_rows(&self, now: DateTime<Utc>) -> Option<Vec<TokenRow>> {
        let guard = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let cached = guard.entry.as_ref()?;
        if cached.loaded_at.elapsed() >= self.cache_ttl {
            return None;
        }
        Some(
            cached
                .rows
                .iter()
                .filter(|row| row.expires_at > now)
                .cloned()
                .collect(),
        )
    }

    fn store_cache(&self, rows: Vec<TokenRow>, loaded_under: u64) {
        if self.cache_ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.generation != loaded_under {
            tracing::debug!("token pool changed during load; not caching");
            return;
        }
        cache.entry = Some(CachedTokens {
            loaded_at: Instant::now(),
            rows,
        });
    }

    fn fallback_candidate(&self, now: DateTime<Utc>) -> Option<Credential> {
        fallback_credential(self.fallback.as_deref()?, now)
    }
}

/// Builds the fallback candidate, skipping it when its decodable expiry has passed.
///
/// A fallback whose claims cannot be decoded is still offered; its expiry is unknown.
pub(crate) fn fallback_credential(token: &str, now: DateTime<Utc>) -> Option<Credential> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let expires_at = decode_expiry(token).ok();
    let credential = Credential {
        id: CredentialId::Fallback,
        token: token.to_string(),
        expires_at,
        added_at: None,
    };
    if credential.is_valid_at(now) {
        Some(credential)
    } else {
        tracing::warn!("configured fallback token has expired; ignoring it");
        None
    }
}
