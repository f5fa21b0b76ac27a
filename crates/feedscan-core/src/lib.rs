pub mod app_config;
pub mod config;
pub mod credentials;
pub mod polling;
pub mod posts;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use credentials::{decode_expiry, fingerprint, validate_new_token, Credential, CredentialId};
pub use polling::{compute_overlap, PollTuning};
pub use posts::{frames_to_duration, orientation, NewPost, Orientation};

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Rejections for a bearer token submitted to the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),
    #[error("token already expired at {expired_at}")]
    AlreadyExpired { expired_at: DateTime<Utc> },
}
