use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::config::SweepConfig;
use crate::scheduler::sweep;
use crate::store::KvStore;

/// Wrap an async task in a cron job. Expressions carry a leading seconds
/// field and are evaluated in UTC.
fn cron_job<F, Fut>(name: &'static str, cron_expr: &str, task: F) -> Result<Job>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Job::new_async(cron_expr, move |_uuid, _lock| {
        let fut = task();
        Box::pin(async move {
            debug!("Running scheduled task: {}", name);
            fut.await;
        })
    })
    .with_context(|| format!("Invalid cron expression for {}: {}", name, cron_expr))
}

/// Build a scheduler carrying the heartbeat and the counter reset. The caller
/// starts and shuts it down.
pub async fn build_scheduler(
    store: Option<Arc<dyn KvStore>>,
    sweep_config: &SweepConfig,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let heartbeat = cron_job("heartbeat", "0 0 * * * *", || async {
        info!("Heartbeat: relay is alive");
    })?;
    scheduler
        .add(heartbeat)
        .await
        .context("Failed to add heartbeat job")?;

    let batch_size = sweep_config.batch_size;
    let reset = cron_job("daily-counter-reset", &sweep_config.cron, move || {
        run_counter_reset(store.clone(), batch_size)
    })?;
    scheduler
        .add(reset)
        .await
        .context("Failed to add counter reset job")?;

    info!("Counter reset scheduled with cron: {}", sweep_config.cron);
    Ok(scheduler)
}

/// One sweep run; nothing is surfaced since there is no caller to answer.
pub async fn run_counter_reset(store: Option<Arc<dyn KvStore>>, batch_size: usize) {
    let Some(store) = store else {
        info!("Counter reset skipped: no key-value store bound");
        return;
    };

    match sweep::reset_counters(store.as_ref(), batch_size).await {
        Ok(report) if report.failed > 0 => error!(
            "Counter reset finished with failures: {} scanned, {} reset, {} failed",
            report.scanned, report.reset, report.failed
        ),
        Ok(report) => info!(
            "Counter reset finished: {} scanned, {} reset",
            report.scanned, report.reset
        ),
        Err(e) => error!("Counter reset aborted: {}", e),
    }
}
