use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub feed_url: String,
    /// Value of the feed's `cut` query parameter (which slice of the feed to read).
    pub feed_cut: String,
    pub fetch_limit: u32,
    pub feed_timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
    /// Raw `Cookie` header value forwarded with every feed request.
    pub feed_cookie: Option<String>,
    /// Used only while the persisted token pool is empty.
    pub fallback_bearer_token: Option<String>,
    pub min_poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub base_poll_interval_ms: u64,
    pub target_overlap_pct: f64,
    pub stats_cache_ttl_ms: u64,
    /// Browser origins allowed to call the token-mutation routes. Empty
    /// means cross-origin callers may only use GET.
    pub cors_origins: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("feed_url", &self.feed_url)
            .field("feed_cut", &self.feed_cut)
            .field("fetch_limit", &self.fetch_limit)
            .field("feed_timeout_secs", &self.feed_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("accept_language", &self.accept_language)
            .field("feed_cookie", &self.feed_cookie.as_ref().map(|_| "[redacted]"))
            .field(
                "fallback_bearer_token",
                &self.fallback_bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .field("min_poll_interval_ms", &self.min_poll_interval_ms)
            .field("max_poll_interval_ms", &self.max_poll_interval_ms)
            .field("base_poll_interval_ms", &self.base_poll_interval_ms)
            .field("target_overlap_pct", &self.target_overlap_pct)
            .field("stats_cache_ttl_ms", &self.stats_cache_ttl_ms)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}
