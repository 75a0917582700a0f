//! Queue workers driving the deployment pipeline
//!
//! One worker loop per logical queue. Each loop leases jobs FIFO, bounded by
//! per-queue concurrency and a rolling rate window, and runs the pipeline to
//! its terminal business outcome. Jobs are acked on any business outcome;
//! nack with backoff is reserved for infrastructure failures raised before
//! the pipeline takes ownership.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::{self, PipelineContext};
use crate::errors::CoreError;
use crate::events::Event;
use crate::models::{DeploymentJob, DeploymentStatus, RollbackJob, ServiceStatus};
use crate::queue::{backoff_delay, JobQueue, QueuedJob, RateWindow};
use crate::store::{deployments, services};

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Lease poll cadence when the queue is idle.
    pub poll_interval: Duration,
    /// Concurrent pipelines per queue.
    pub concurrency: usize,
    /// Jobs admitted per rate window.
    pub rate_limit: usize,
    /// Rolling rate window length.
    pub rate_window: Duration,
    /// Queue-level delivery attempts per job.
    pub max_attempts: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            concurrency: 2,
            rate_limit: 5,
            rate_window: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

/// Run the build-queue worker loop.
pub async fn run_build_worker(
    options: &Options,
    queue: JobQueue,
    ctx: PipelineContext,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    run_worker(options, queue, ctx, JobKind::Build, shutdown_signal).await;
}

/// Run the rollback-queue worker loop.
pub async fn run_rollback_worker(
    options: &Options,
    queue: JobQueue,
    ctx: PipelineContext,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    run_worker(options, queue, ctx, JobKind::Rollback, shutdown_signal).await;
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Build,
    Rollback,
}

async fn run_worker(
    options: &Options,
    queue: JobQueue,
    ctx: PipelineContext,
    kind: JobKind,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!(queue = queue.name(), "Deployer worker starting...");

    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let mut rate = RateWindow::new(options.rate_limit, options.rate_window);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!(queue = queue.name(), "Deployer worker shutting down...");
                break;
            }
            _ = tokio::time::sleep(options.poll_interval) => {}
        }

        // Admission order: rate window first, then a concurrency permit,
        // then the lease. Leased jobs are never parked.
        if rate.next_slot(Instant::now()).is_some() {
            continue;
        }
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            continue;
        };

        match queue.lease().await {
            Ok(Some((job_id, job))) => {
                rate.try_admit(Instant::now());
                let ctx = ctx.clone();
                let queue = queue.clone();
                let max_attempts = options.max_attempts;
                tokio::spawn(async move {
                    let _permit = permit;
                    process(ctx, queue, kind, job_id, job, max_attempts).await;
                });
            }
            Ok(None) => drop(permit),
            Err(e) => {
                error!(queue = queue.name(), "Failed to lease job: {e}");
                drop(permit);
            }
        }
    }

    // Drain: wait for in-flight pipelines to finish.
    let _ = semaphore.acquire_many(options.concurrency as u32).await;
    info!(queue = queue.name(), "Deployer worker drained");
}

async fn process(
    ctx: PipelineContext,
    queue: JobQueue,
    kind: JobKind,
    job_id: String,
    job: QueuedJob,
    max_attempts: u32,
) {
    let attempt = job.attempts;
    let outcome = match kind {
        JobKind::Build => match serde_json::from_value::<DeploymentJob>(job.payload) {
            Ok(job) => deploy::run_deployment(&ctx, &job).await,
            Err(e) => {
                error!(job_id, "Discarding malformed build job: {e}");
                queue.ack(&job_id).await.ok();
                return;
            }
        },
        JobKind::Rollback => match serde_json::from_value::<RollbackJob>(job.payload) {
            Ok(job) => deploy::run_rollback(&ctx, &job).await,
            Err(e) => {
                error!(job_id, "Discarding malformed rollback job: {e}");
                queue.ack(&job_id).await.ok();
                return;
            }
        },
    };

    match outcome {
        Ok(result) => {
            debug!(job_id, ?result, "Pipeline finished");
            if let Err(e) = queue.ack(&job_id).await {
                error!(job_id, "Failed to ack completed job: {e}");
            }
        }
        Err(infra_error) => {
            warn!(job_id, attempt, "Pipeline could not start: {infra_error}");
            tokio::time::sleep(backoff_delay(attempt)).await;
            match queue.nack(&job_id, max_attempts).await {
                Ok(true) => {}
                Ok(false) => {
                    // Attempts exhausted: record the terminal failure so no
                    // deployment stays BUILDING forever.
                    record_exhausted(&ctx, &job_id, &infra_error).await;
                }
                Err(e) => error!(job_id, "Failed to nack job: {e}"),
            }
        }
    }
}

/// Best-effort terminal FAILED after queue retries are spent. The store may
/// still be down; the reconciler converges the service either way.
async fn record_exhausted(ctx: &PipelineContext, job_id: &str, cause: &CoreError) {
    let Ok(deployment_id) = Uuid::parse_str(job_id) else {
        return;
    };

    let logs = format!("deployment failed: {cause}\n");
    if let Err(e) = deployments::finish(
        &ctx.pool,
        deployment_id,
        DeploymentStatus::Failed,
        &logs,
        Utc::now(),
    )
    .await
    {
        error!(job_id, "Failed to record exhausted job: {e}");
        return;
    }

    if let Ok(Some(deployment)) = deployments::get(&ctx.pool, deployment_id).await {
        services::set_status(&ctx.pool, deployment.service_id, ServiceStatus::Failed)
            .await
            .ok();
        ctx.publisher
            .publish_best_effort(&Event::deployment_status(
                deployment_id,
                DeploymentStatus::Failed,
                None,
            ))
            .await;
        ctx.publisher
            .publish_best_effort(&Event::service_status(
                deployment.service_id,
                ServiceStatus::Failed,
            ))
            .await;
    }
}
