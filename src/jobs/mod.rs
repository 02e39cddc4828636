use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use crate::metrics;

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn cleanup tasks
        tokio::spawn(Self::verification_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::rate_limit_prune_job(Arc::clone(&self)));

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Drop expired verification codes (default every 5 minutes)
    async fn verification_sweep_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.verification.sweep_interval;
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            debug!("Running verification code sweep");
            let started = Instant::now();

            match tasks::sweep_verification_codes(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job(
                        "verification_sweep",
                        "success",
                        started.elapsed().as_secs_f64(),
                    );
                    if count > 0 {
                        info!("Removed {} expired verification codes", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job(
                        "verification_sweep",
                        "failure",
                        started.elapsed().as_secs_f64(),
                    );
                    error!("Failed to sweep verification codes: {}", e);
                }
            }
        }
    }

    /// Drop idle clients from the rate limiters (every minute)
    async fn rate_limit_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            let started = Instant::now();
            let tracked = tasks::prune_rate_limiters(&scheduler.context);
            metrics::record_background_job(
                "rate_limit_prune",
                "success",
                started.elapsed().as_secs_f64(),
            );
            debug!("Rate limiters tracking {} clients", tracked);
        }
    }

    /// Probe the object store and refresh the uptime gauge (every minute)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            let started = Instant::now();

            metrics::UPTIME_SECONDS.set(scheduler.context.started_at.elapsed().as_secs_f64());

            match tasks::health_check(&scheduler.context).await {
                Ok(()) => metrics::record_background_job(
                    "health_check",
                    "success",
                    started.elapsed().as_secs_f64(),
                ),
                Err(e) => {
                    metrics::record_background_job(
                        "health_check",
                        "failure",
                        started.elapsed().as_secs_f64(),
                    );
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
