mod api;
mod credentials;
mod middleware;
mod scheduler;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use feedscan_core::PollTuning;
use feedscan_db::{ScannerStatus, TokenStore};
use feedscan_feed::{FeedClient, TokenRotatingFetcher};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    credentials::PgTokenSource,
    scheduler::{PgScanSink, ScanScheduler},
    stats::StatsService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(feedscan_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting feedscan-server");

    let pool_config = feedscan_db::PoolConfig::from_app_config(&config);
    let pool = feedscan_db::connect_pool(&config.database_url, pool_config).await?;
    feedscan_db::run_migrations(&pool).await?;
    feedscan_db::ping(&pool).await?;
    let version = feedscan_db::server_version(&pool).await?;
    tracing::info!(%version, "connected to postgres");

    let tokens = TokenStore::new(pool.clone(), config.fallback_bearer_token.clone());
    tokens.purge_expired().await?;

    let tuning = PollTuning::from_app_config(&config);
    let base_interval = i64::try_from(tuning.base_interval_ms).unwrap_or(i64::MAX);
    feedscan_db::mark_scanner_starting(&pool, base_interval).await?;

    let stats = StatsService::new(
        pool.clone(),
        config.fallback_bearer_token.clone(),
        Duration::from_millis(config.stats_cache_ttl_ms),
    );

    let fetcher = TokenRotatingFetcher::new(
        FeedClient::from_app_config(&config)?,
        PgTokenSource::new(tokens.clone()),
    );
    let scanner = Arc::new(ScanScheduler::new(
        fetcher,
        PgScanSink::new(pool.clone(), stats.clone()),
        tuning,
        config.fetch_limit,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scan_task = tokio::spawn(Arc::clone(&scanner).run(shutdown_rx));

    let mut maintenance = scheduler::maintenance::build_scheduler(tokens.clone()).await?;

    let app = build_app(
        AppState {
            pool: pool.clone(),
            tokens,
            stats,
        },
        &config.cors_origins,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The loop stops at its next wait; a scan already in flight completes first.
    shutdown_tx.send_replace(true);
    let final_interval = match scan_task.await {
        Ok(interval) => interval,
        Err(e) => {
            tracing::error!(error = %e, "scan loop task failed");
            scanner.current_interval_ms().await
        }
    };
    if let Err(e) = maintenance.shutdown().await {
        tracing::warn!(error = %e, "maintenance scheduler did not shut down cleanly");
    }

    let final_interval = i64::try_from(final_interval).unwrap_or(i64::MAX);
    if let Err(e) =
        feedscan_db::mark_scanner_status(&pool, ScannerStatus::Stopped, final_interval).await
    {
        tracing::error!(error = %e, "failed to mark scanner stopped");
    }
    pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
