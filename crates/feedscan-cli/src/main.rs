mod probe;
mod tokens;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::tokens::TokensCommands;

#[derive(Debug, Parser)]
#[command(name = "feedscan-cli")]
#[command(about = "feedscan command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage the bearer token pool
    Tokens {
        #[command(subcommand)]
        command: TokensCommands,
    },
    /// Print the dashboard snapshot as JSON
    Stats {
        /// Number of recent scans to include
        #[arg(long, default_value = "15")]
        recent: i64,
    },
    /// Fetch one feed page with token rotation and report what it contains
    Probe {
        /// Items to request (defaults to FEEDSCAN_FETCH_LIMIT)
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("feedscan-cli: no command given; run with --help for usage");
        return Ok(());
    };

    let config = feedscan_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    // stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = feedscan_db::PoolConfig::from_app_config(&config);
    let pool = feedscan_db::connect_pool(&config.database_url, pool_config).await?;
    feedscan_db::run_migrations(&pool).await?;
    let store = feedscan_db::TokenStore::new(pool.clone(), config.fallback_bearer_token.clone());

    let result = match command {
        Commands::Tokens { command } => tokens::run(&pool, &store, command).await,
        Commands::Stats { recent } => {
            run_stats(&pool, config.fallback_bearer_token.as_deref(), recent).await
        }
        Commands::Probe { limit } => {
            probe::run_probe(&pool, &config, store, limit.unwrap_or(config.fetch_limit)).await
        }
    };

    pool.close().await;
    result
}

/// Print the full dashboard snapshot as pretty JSON.
///
/// # Errors
///
/// Returns an error if any dashboard query fails.
async fn run_stats(
    pool: &sqlx::PgPool,
    fallback: Option<&str>,
    recent: i64,
) -> anyhow::Result<()> {
    let snapshot = feedscan_db::load_dashboard(pool, fallback, recent.clamp(1, 200)).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
