//! Token pool command handlers for the CLI.
//!
//! Raw token values are accepted as arguments but never printed; listings
//! show fingerprints only.

use clap::Subcommand;
use feedscan_db::{DbError, TokenPoolSummary, TokenStore};

/// Sub-commands available under `tokens`.
#[derive(Debug, Subcommand)]
pub enum TokensCommands {
    /// Validate and add a bearer token to the pool
    Add {
        /// Raw bearer token (JWT)
        token: String,
    },
    /// List valid tokens with their expiry
    List,
    /// Remove a token by id
    Remove {
        /// Row id as shown by `tokens list`
        id: i64,
    },
    /// Remove a token by its value
    RemoveValue {
        /// Raw bearer token
        token: String,
    },
    /// Delete every expired token
    Purge,
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    store: &TokenStore,
    command: TokensCommands,
) -> anyhow::Result<()> {
    match command {
        TokensCommands::Add { token } => run_tokens_add(store, &token).await,
        TokensCommands::List => run_tokens_list(pool, store).await,
        TokensCommands::Remove { id } => run_tokens_remove(store, id).await,
        TokensCommands::RemoveValue { token } => run_tokens_remove_value(store, &token).await,
        TokensCommands::Purge => {
            let purged = store.purge_expired().await?;
            println!("purged {purged} expired token(s)");
            Ok(())
        }
    }
}

/// Add a token to the pool, printing its id and decoded expiry.
///
/// # Errors
///
/// Returns an error if the token cannot be decoded, has already expired, or
/// the insert fails.
async fn run_tokens_add(store: &TokenStore, token: &str) -> anyhow::Result<()> {
    let row = match store.add(token).await {
        Ok(row) => row,
        Err(DbError::Token(reason)) => anyhow::bail!("token rejected: {reason}"),
        Err(e) => return Err(e.into()),
    };
    println!(
        "token {} stored (expires {})",
        row.id,
        row.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

async fn run_tokens_list(pool: &sqlx::PgPool, store: &TokenStore) -> anyhow::Result<()> {
    let summary = feedscan_db::list_token_summaries(pool, store.fallback_token()).await?;
    print!("{}", render_token_table(&summary));
    Ok(())
}

async fn run_tokens_remove(store: &TokenStore, id: i64) -> anyhow::Result<()> {
    if !store.remove(id).await? {
        anyhow::bail!("no token with id {id}");
    }
    println!("token {id} removed");
    Ok(())
}

async fn run_tokens_remove_value(store: &TokenStore, token: &str) -> anyhow::Result<()> {
    if !store.remove_by_value(token).await? {
        anyhow::bail!("token is not in the pool");
    }
    println!("token removed");
    Ok(())
}

/// Fixed-width table of the pool, one token per line.
pub(crate) fn render_token_table(summary: &TokenPoolSummary) -> String {
    if summary.tokens.is_empty() {
        return "no valid tokens; add one with `tokens add <TOKEN>`\n".to_string();
    }

    let mut out = format!(
        "{:<8}{:<8}{:<15}{:<22}ADDED\n",
        "ID", "SOURCE", "FINGERPRINT", "EXPIRES"
    );
    for token in &summary.tokens {
        let expires = token.expires_at.map_or_else(
            || "unknown".to_string(),
            |t| t.format("%Y-%m-%d %H:%M UTC").to_string(),
        );
        let added = token.added_at.map_or_else(
            || "-".to_string(),
            |t| t.format("%Y-%m-%d %H:%M UTC").to_string(),
        );
        out.push_str(&format!(
            "{:<8}{:<8}{:<15}{:<22}{}\n",
            token.id.to_string(),
            token.source,
            token.fingerprint,
            expires,
            added
        ));
    }
    out.push_str(&format!("{} valid token(s)\n", summary.count));
    out
}
