use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`
/// lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("FEEDSCAN_ENV", "development"));
    let bind_addr = parse_addr("FEEDSCAN_BIND_ADDR", "0.0.0.0:4000")?;
    let log_level = or_default("FEEDSCAN_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("FEEDSCAN_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("FEEDSCAN_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("FEEDSCAN_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let feed_url = or_default(
        "FEEDSCAN_FEED_URL",
        "https://sora.chatgpt.com/backend/project_y/feed",
    );
    let feed_cut = or_default("FEEDSCAN_FEED_CUT", "nf2_latest");
    let fetch_limit = parse_u32("FEEDSCAN_FETCH_LIMIT", "200")?;
    if fetch_limit == 0 {
        return Err(invalid("FEEDSCAN_FETCH_LIMIT", "must be greater than 0".into()));
    }
    let feed_timeout_secs = parse_u64("FEEDSCAN_FEED_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("FEEDSCAN_USER_AGENT", "feedscan/0.1");
    let accept_language = or_default("FEEDSCAN_ACCEPT_LANGUAGE", "en-US,en;q=0.9");
    let feed_cookie = optional("FEEDSCAN_FEED_COOKIE");
    let fallback_bearer_token = optional("FEEDSCAN_FALLBACK_BEARER_TOKEN");

    let min_poll_interval_ms = parse_u64("FEEDSCAN_MIN_POLL_INTERVAL_MS", "6000")?;
    let max_poll_interval_ms = parse_u64("FEEDSCAN_MAX_POLL_INTERVAL_MS", "30000")?;
    let base_poll_interval_ms = parse_u64("FEEDSCAN_BASE_POLL_INTERVAL_MS", "10000")?;
    if min_poll_interval_ms == 0 {
        return Err(invalid(
            "FEEDSCAN_MIN_POLL_INTERVAL_MS",
            "must be greater than 0".into(),
        ));
    }
    if min_poll_interval_ms > max_poll_interval_ms {
        return Err(invalid(
            "FEEDSCAN_MAX_POLL_INTERVAL_MS",
            format!("must be >= FEEDSCAN_MIN_POLL_INTERVAL_MS ({min_poll_interval_ms})"),
        ));
    }
    if !(min_poll_interval_ms..=max_poll_interval_ms).contains(&base_poll_interval_ms) {
        return Err(invalid(
            "FEEDSCAN_BASE_POLL_INTERVAL_MS",
            format!("must lie within [{min_poll_interval_ms}, {max_poll_interval_ms}]"),
        ));
    }

    let target_overlap_pct = parse_f64("FEEDSCAN_TARGET_OVERLAP_PCT", "30")?;
    if !(0.0..=100.0).contains(&target_overlap_pct) {
        return Err(invalid(
            "FEEDSCAN_TARGET_OVERLAP_PCT",
            "must lie within [0, 100]".into(),
        ));
    }

    let stats_cache_ttl_ms = parse_u64("FEEDSCAN_STATS_CACHE_TTL_MS", "5000")?;
    let cors_origins = optional("FEEDSCAN_CORS_ORIGINS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        feed_url,
        feed_cut,
        fetch_limit,
        feed_timeout_secs,
        user_agent,
        accept_language,
        feed_cookie,
        fallback_bearer_token,
        min_poll_interval_ms,
        max_poll_interval_ms,
        base_poll_interval_ms,
        target_overlap_pct,
        stats_cache_ttl_ms,
        cors_origins,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
