use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static AUTH_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invalid token|jwt").expect("valid auth message regex"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no valid bearer tokens available")]
    NoTokensAvailable,

    #[error("upstream rejected credentials with HTTP {status}")]
    Unauthorized { status: u16 },

    #[error("invalid feed response: {0}")]
    InvalidResponse(String),

    #[error("feed request timed out")]
    Timeout,

    #[error("unexpected HTTP status {status} from feed")]
    Upstream { status: u16 },

    #[error("HTTP error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("token store error: {0}")]
    TokenStore(String),
}

impl FetchError {
    /// Whether this failure means the credential itself was rejected, so the
    /// next candidate should be tried.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            FetchError::Unauthorized { .. } => true,
            FetchError::InvalidResponse(message) => AUTH_MESSAGE.is_match(message),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_auth_failure() {
        assert!(FetchError::Unauthorized { status: 401 }.is_auth_failure());
        assert!(FetchError::Unauthorized { status: 403 }.is_auth_failure());
    }

    #[test]
    fn error_envelope_mentioning_token_is_auth_failure() {
        let err = FetchError::InvalidResponse(r#"API error: {"message":"Invalid token"}"#.into());
        assert!(err.is_auth_failure());
        let err = FetchError::InvalidResponse("JWT expired".into());
        assert!(err.is_auth_failure());
    }

    #[test]
    fn other_failures_are_not_auth_failures() {
        assert!(!FetchError::InvalidResponse("missing items".into()).is_auth_failure());
        assert!(!FetchError::Upstream { status: 502 }.is_auth_failure());
        assert!(!FetchError::Timeout.is_auth_failure());
        assert!(!FetchError::NoTokensAvailable.is_auth_failure());
    }
}
