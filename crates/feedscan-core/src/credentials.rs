//! Bearer credentials for the upstream feed.
//!
//! Tokens are JWTs issued by the upstream login flow. The pool never verifies
//! signatures; it only reads the `exp` claim so expired tokens can be dropped
//! before they reach the network.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::TokenError;

/// Where a candidate credential came from.
///
/// Serializes as the row id, or the string `"env"` for the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialId {
    /// Row id in the persisted token pool.
    Stored(i64),
    /// The statically configured fallback token.
    Fallback,
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialId::Stored(id) => write!(f, "{id}"),
            CredentialId::Fallback => write!(f, "env"),
        }
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CredentialId::Stored(id) => serializer.serialize_i64(*id),
            CredentialId::Fallback => serializer.serialize_str("env"),
        }
    }
}

/// One candidate bearer token handed to the feed fetcher.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: CredentialId,
    pub token: String,
    /// `None` only for a fallback token whose claims could not be decoded.
    pub expires_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
}

impl Credential {
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.id == CredentialId::Fallback
    }

    /// Whether the credential is still usable at `now`. Unknown expiry counts as valid.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("token", &fingerprint(&self.token))
            .field("expires_at", &self.expires_at)
            .field("added_at", &self.added_at)
            .finish()
    }
}

/// Decode the `exp` claim of a JWT without verifying its signature.
///
/// # Errors
///
/// Returns [`TokenError::InvalidFormat`] if the token is not three
/// dot-separated segments, the payload is not base64 JSON, or `exp` is
/// missing or non-positive.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::InvalidFormat(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|e| TokenError::InvalidFormat(format!("payload is not base64: {e}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::InvalidFormat(format!("payload is not JSON: {e}")))?;

    let exp = claims
        .get("exp")
        .and_then(serde_json::Value::as_f64)
        .filter(|exp| *exp > 0.0)
        .ok_or_else(|| TokenError::InvalidFormat("missing exp claim".to_string()))?;

    #[allow(clippy::cast_possible_truncation)]
    DateTime::from_timestamp(exp.floor() as i64, 0)
        .ok_or_else(|| TokenError::InvalidFormat(format!("exp {exp} is out of range")))
}

/// Validate a token submitted to the pool and return it trimmed along with its expiry.
///
/// # Errors
///
/// Returns [`TokenError::InvalidFormat`] for empty or undecodable tokens and
/// [`TokenError::AlreadyExpired`] when the expiry is not after `now`.
pub fn validate_new_token(
    raw: &str,
    now: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>), TokenError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(TokenError::InvalidFormat("token is empty".to_string()));
    }

    let expires_at = decode_expiry(token)?;
    if expires_at <= now {
        return Err(TokenError::AlreadyExpired {
            expired_at: expires_at,
        });
    }

    Ok((token.to_string(), expires_at))
}

/// Short, stable identifier for a token that is safe to log or display.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}
