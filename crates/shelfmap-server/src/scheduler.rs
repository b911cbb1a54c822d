//! Background job scheduler.
//!
//! Drains the notification outbox once a minute so deliveries that failed
//! inline are retried on their backoff schedule.

use std::sync::Arc;

use shelfmap_lifecycle::OutboxWorker;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Every minute, on the minute.
const OUTBOX_DRAIN_SCHEDULE: &str = "0 * * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(worker: Arc<OutboxWorker>) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_outbox_job(&scheduler, worker).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_outbox_job(
    scheduler: &JobScheduler,
    worker: Arc<OutboxWorker>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(OUTBOX_DRAIN_SCHEDULE, move |_uuid, _lock| {
        let worker = Arc::clone(&worker);

        Box::pin(async move {
            match worker.drain_outbox().await {
                Ok(report) if report.sent + report.retried + report.failed > 0 => {
                    tracing::info!(
                        sent = report.sent,
                        retried = report.retried,
                        failed = report.failed,
                        "scheduler: outbox drained"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: outbox drain failed");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
