//! Fixed-cadence housekeeping jobs.

use feedscan_db::TokenStore;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Top of every hour.
const TOKEN_PURGE_CRON: &str = "0 0 * * * *";

/// Builds and starts the maintenance scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// job cannot be registered, or the scheduler cannot be started.
pub async fn build_scheduler(tokens: TokenStore) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_token_purge_job(&scheduler, tokens).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_token_purge_job(
    scheduler: &JobScheduler,
    tokens: TokenStore,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(TOKEN_PURGE_CRON, move |_uuid, _lock| {
        let tokens = tokens.clone();
        Box::pin(async move {
            match tokens.purge_expired().await {
                Ok(purged) => tracing::debug!(purged, "scheduler: token purge complete"),
                Err(e) => tracing::error!(error = %e, "scheduler: token purge failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = TOKEN_PURGE_CRON, "scheduler: registered token purge job");
    Ok(())
}
