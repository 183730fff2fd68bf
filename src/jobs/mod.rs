use crate::{context::AppContext, error::AppResult, metrics};
use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub mod tasks;

/// Job scheduler for background tasks
///
/// The managers never schedule work themselves; this is the only periodic
/// trigger for the expiry sweep, plan downgrades and stale report cleanup.
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::listing_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::plan_reset_job(Arc::clone(&self)));
        tokio::spawn(Self::stale_report_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Expire listings past their lifetime
    async fn listing_sweep_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.listing_sweep_interval;
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            debug!("Running listing expiry sweep");

            if let Some(count) = run_timed("listing_sweep", tasks::sweep_expired_listings(&scheduler.context)).await {
                if count > 0 {
                    info!("Listing sweep expired {} listings", count);
                }
            }
        }
    }

    /// Downgrade lapsed paid plans
    async fn plan_reset_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.plan_reset_interval;
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            debug!("Running plan expiry reset");

            if let Some(count) = run_timed("plan_reset", tasks::reset_expired_plans(&scheduler.context)).await {
                if count > 0 {
                    info!("Downgraded {} lapsed plans", count);
                }
            }
        }
    }

    /// Expire reports nobody reviewed
    async fn stale_report_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.stale_report_interval;
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            debug!("Running stale report cleanup");

            if let Some(count) = run_timed("stale_reports", tasks::expire_stale_reports(&scheduler.context)).await {
                if count > 0 {
                    info!("Expired {} stale reports", count);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}

/// Run one job iteration, recording its outcome and duration
async fn run_timed<T>(job_type: &str, job: impl Future<Output = AppResult<T>>) -> Option<T> {
    let started = Instant::now();
    let result = job.await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(value) => {
            metrics::record_background_job(job_type, "success", elapsed);
            Some(value)
        }
        Err(e) => {
            metrics::record_background_job(job_type, "failure", elapsed);
            error!("Background job {} failed: {}", job_type, e);
            None
        }
    }
}
