//! Pipeline state machine
//!
//! Each state is resumable only at its boundary; external calls (clone,
//! build, health attempts, runtime calls) are individually bounded by
//! timeouts. Business failures terminate the deployment as FAILED and are
//! never retried at the queue level.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::deploy::{git, image, DeployLogger};
use crate::docker::health::{self, HealthCheckOptions};
use crate::docker::{self, ContainerRuntime, RunSpec};
use crate::errors::CoreError;
use crate::events::{Event, EventPublisher};
use crate::models::{
    DeploymentJob, DeploymentStatus, HealthCheckParams, RollbackJob, Service, ServiceStatus,
};
use crate::store::{deployments, domains, services};

/// Shared dependencies for pipeline runs.
#[derive(Clone)]
pub struct PipelineContext {
    pub pool: PgPool,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub publisher: EventPublisher,
    pub config: Arc<Config>,
}

/// Terminal business outcome of one run. Either way the job is complete;
/// queue retries are reserved for infrastructure errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Success,
    Failed,
}

/// Release policy for the run step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStrategy {
    /// New revision runs alongside the old until health is confirmed.
    BlueGreen,
    /// Stop the old container, then start the new one.
    Traditional,
}

/// Blue/green applies iff the service already has a live container and a
/// health check is configured to gate the swap.
pub fn plan_strategy(has_live_container: bool, has_health_check: bool) -> RunStrategy {
    if has_live_container && has_health_check {
        RunStrategy::BlueGreen
    } else {
        RunStrategy::Traditional
    }
}

/// How a failed step disposes of the service.
enum StepError {
    /// The service is marked FAILED.
    Fatal(CoreError),
    /// Blue/green health gate failed: the old container stays live and the
    /// service returns to RUNNING.
    HealthGate(String),
}

impl From<CoreError> for StepError {
    fn from(err: CoreError) -> Self {
        StepError::Fatal(err)
    }
}

/// Inputs for the run + finalize tail shared by deployments and rollbacks.
struct ReleasePlan {
    service_id: Uuid,
    subdomain: String,
    image_tag: String,
    env: std::collections::HashMap<String, String>,
    health_check: Option<HealthCheckParams>,
}

/// Drive one deployment job to a terminal outcome.
///
/// An `Err` means the pipeline never took ownership of the job (the store or
/// bus failed during init); the caller may retry at the queue level. After
/// init every failure becomes a terminal FAILED outcome.
pub async fn run_deployment(
    ctx: &PipelineContext,
    job: &DeploymentJob,
) -> Result<DeploymentOutcome, CoreError> {
    let logger = DeployLogger::new(job.deployment_id, ctx.publisher.clone());
    let work_dir = std::env::temp_dir().join(job.deployment_id.to_string());

    info!(deployment = %job.deployment_id, service = %job.service_id, "Deployment started");
    init(ctx, &logger, job.deployment_id, job.service_id).await?;

    let result = build_and_release(ctx, job, &logger, &work_dir).await;

    // The work directory is owned by this run; deletion is unconditional.
    if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %work_dir.display(), "Failed to clean work directory: {e}");
        }
    }

    Ok(finalize(ctx, &logger, job.deployment_id, job.service_id, result).await)
}

/// Drive one rollback job: no clone or build, the prior image is reused.
pub async fn run_rollback(
    ctx: &PipelineContext,
    job: &RollbackJob,
) -> Result<DeploymentOutcome, CoreError> {
    let logger = DeployLogger::new(job.deployment_id, ctx.publisher.clone());

    info!(deployment = %job.deployment_id, service = %job.service_id, "Rollback started");
    init(ctx, &logger, job.deployment_id, job.service_id).await?;
    logger
        .log(format!("Rolling back to image {}", job.image_tag))
        .await;

    let plan = ReleasePlan {
        service_id: job.service_id,
        subdomain: job.subdomain.clone(),
        image_tag: job.image_tag.clone(),
        env: job.env.clone(),
        health_check: job.health_check.clone(),
    };
    let result = release(ctx, &logger, &plan).await;

    Ok(finalize(ctx, &logger, job.deployment_id, job.service_id, result).await)
}

async fn build_and_release(
    ctx: &PipelineContext,
    job: &DeploymentJob,
    logger: &DeployLogger,
    work_dir: &Path,
) -> Result<String, StepError> {
    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(CoreError::from)?;

    // Clone. The log line always shows the public URL; any token lives only
    // in the URL handed to the subprocess.
    logger
        .log(format!(
            "Cloning {} (branch {})",
            git::redact_url(&job.repo_url),
            job.branch
        ))
        .await;
    let commit_sha = git::clone_repo(
        &job.repo_url,
        job.source_token.as_deref(),
        &job.branch,
        work_dir,
        ctx.config.clone_timeout,
    )
    .await?;
    deployments::set_commit_sha(&ctx.pool, job.deployment_id, &commit_sha).await?;
    logger
        .log(format!("Checked out commit {}", &commit_sha[..commit_sha.len().min(7)]))
        .await;

    // Detect & build. The tag is persisted as soon as the build succeeds so
    // a later rollback can reuse it.
    let tag = image::image_tag(&job.subdomain, &commit_sha);
    image::build_image(work_dir, &tag, ctx.config.build_timeout, logger).await?;
    deployments::set_image_tag(&ctx.pool, job.deployment_id, &tag).await?;
    logger.log(format!("Image {tag} ready")).await;

    let plan = ReleasePlan {
        service_id: job.service_id,
        subdomain: job.subdomain.clone(),
        image_tag: tag,
        env: job.env.clone(),
        health_check: job.health_check.clone(),
    };
    release(ctx, logger, &plan).await
}

/// State 1: move the deployment to BUILDING and the service to DEPLOYING.
async fn init(
    ctx: &PipelineContext,
    logger: &DeployLogger,
    deployment_id: Uuid,
    service_id: Uuid,
) -> Result<(), CoreError> {
    deployments::mark_building(&ctx.pool, deployment_id, Utc::now()).await?;
    ctx.publisher
        .publish_best_effort(&Event::deployment_status(
            deployment_id,
            DeploymentStatus::Building,
            None,
        ))
        .await;

    services::set_status(&ctx.pool, service_id, ServiceStatus::Deploying).await?;
    ctx.publisher
        .publish_best_effort(&Event::service_status(service_id, ServiceStatus::Deploying))
        .await;

    logger.log("Deployment picked up by worker").await;
    Ok(())
}

/// States 4–5: fetch routing inputs and run the new revision under the
/// selected policy. Returns the id of the final live container.
async fn release(
    ctx: &PipelineContext,
    logger: &DeployLogger,
    plan: &ReleasePlan,
) -> Result<String, StepError> {
    let service = services::get(&ctx.pool, plan.service_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("service {}", plan.service_id)))?;

    let custom_domains: Vec<String> = domains::list_verified(&ctx.pool, plan.service_id)
        .await?
        .into_iter()
        .map(|d| d.hostname)
        .collect();
    if !custom_domains.is_empty() {
        logger
            .log(format!("Routing {} verified custom domain(s)", custom_domains.len()))
            .await;
    }

    let has_health_check = plan
        .health_check
        .as_ref()
        .is_some_and(|hc| !hc.path.is_empty());
    let strategy = plan_strategy(service.container_id.is_some(), has_health_check);

    let spec = RunSpec {
        image_tag: plan.image_tag.clone(),
        subdomain: plan.subdomain.clone(),
        env: plan.env.clone(),
        container_port: ctx.config.container_port,
        custom_domains,
        name_override: None,
    };

    match strategy {
        RunStrategy::BlueGreen => {
            let health_check = plan.health_check.as_ref().ok_or_else(|| {
                CoreError::Internal("blue/green selected without health check".to_string())
            })?;
            blue_green(ctx, logger, &service, &spec, health_check).await
        }
        RunStrategy::Traditional => {
            traditional(ctx, logger, &service, &spec, plan.health_check.as_ref()).await
        }
    }
}

/// Blue/green: stage the new revision beside the old one, gate on health,
/// then swap. On a failed gate the old container keeps serving.
async fn blue_green(
    ctx: &PipelineContext,
    logger: &DeployLogger,
    service: &Service,
    spec: &RunSpec,
    health_check: &HealthCheckParams,
) -> Result<String, StepError> {
    let staging_spec = RunSpec {
        name_override: Some(docker::staging_name(&spec.subdomain)),
        ..spec.clone()
    };

    logger.log("Starting staging container for blue/green swap").await;
    let staging_id = ctx.runtime.run(&staging_spec).await?;

    match check_health(ctx, logger, &staging_id, health_check).await {
        Ok(attempts) => {
            logger
                .log(format!("Health check passed after {attempts} attempt(s)"))
                .await;
        }
        Err(e) => {
            logger.log(format!("Health check failed: {e}")).await;
            logger
                .log("Removing staging container, current revision stays live")
                .await;
            ctx.runtime.remove(&staging_id).await.ok();
            return Err(StepError::HealthGate(e.to_string()));
        }
    }

    // Swap: old and staging go away, the image restarts under the canonical
    // name. Both containers matched the subdomain router during the overlap,
    // which the proxy load-balances across; the brief window with neither is
    // accepted (see DESIGN.md).
    if let Some(old_id) = &service.container_id {
        if let Err(e) = ctx.runtime.remove(old_id).await {
            warn!(container = %old_id, "Failed to remove previous container: {e}");
        }
    }
    ctx.runtime.remove(&staging_id).await.ok();

    let final_id = ctx.runtime.run(spec).await?;
    logger.log("Swapped to new revision").await;
    Ok(final_id)
}

/// Traditional: stop the old container, start the new one, then health-check
/// if configured. A failed check removes the new container.
async fn traditional(
    ctx: &PipelineContext,
    logger: &DeployLogger,
    service: &Service,
    spec: &RunSpec,
    health_check: Option<&HealthCheckParams>,
) -> Result<String, StepError> {
    if let Some(old_id) = &service.container_id {
        logger.log("Stopping current container").await;
        if let Err(e) = ctx.runtime.stop(old_id).await {
            warn!(container = %old_id, "Failed to stop previous container: {e}");
        }
    }

    logger.log("Starting container").await;
    let new_id = ctx.runtime.run(spec).await?;

    if let Some(hc) = health_check.filter(|hc| !hc.path.is_empty()) {
        match check_health(ctx, logger, &new_id, hc).await {
            Ok(attempts) => {
                logger
                    .log(format!("Health check passed after {attempts} attempt(s)"))
                    .await;
            }
            Err(e) => {
                logger.log(format!("Health check failed: {e}")).await;
                ctx.runtime.remove(&new_id).await.ok();
                return Err(StepError::Fatal(CoreError::Deploy(format!(
                    "health check failed: {e}"
                ))));
            }
        }
    }

    Ok(new_id)
}

async fn check_health(
    ctx: &PipelineContext,
    logger: &DeployLogger,
    container_id: &str,
    health_check: &HealthCheckParams,
) -> Result<u32, CoreError> {
    let ip = ctx.runtime.ip(container_id).await?;
    let options = HealthCheckOptions {
        start_delay: ctx.config.health_check_start_delay,
        timeout: health_check
            .timeout_secs
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(ctx.config.health_check_timeout),
        retries: ctx.config.health_check_retries,
    };

    logger
        .log(format!(
            "Health-checking {} on port {}",
            health_check.path, ctx.config.container_port
        ))
        .await;
    health::wait_until_healthy(&ip, ctx.config.container_port, &health_check.path, &options).await
}

/// State 6: write the terminal outcome and emit terminal events.
async fn finalize(
    ctx: &PipelineContext,
    logger: &DeployLogger,
    deployment_id: Uuid,
    service_id: Uuid,
    result: Result<String, StepError>,
) -> DeploymentOutcome {
    match result {
        Ok(container_id) => {
            logger.log("Deployment completed successfully").await;

            if let Err(e) =
                deployments::finish(&ctx.pool, deployment_id, DeploymentStatus::Success, &logger.contents(), Utc::now())
                    .await
            {
                error!(deployment = %deployment_id, "Failed to record success: {e}");
            }
            if let Err(e) = services::mark_running(&ctx.pool, service_id, &container_id).await {
                error!(service = %service_id, "Failed to mark service running: {e}");
            }

            ctx.publisher
                .publish_best_effort(&Event::deployment_status(
                    deployment_id,
                    DeploymentStatus::Success,
                    Some(container_id),
                ))
                .await;
            ctx.publisher
                .publish_best_effort(&Event::service_status(service_id, ServiceStatus::Running))
                .await;

            info!(deployment = %deployment_id, "Deployment succeeded");
            DeploymentOutcome::Success
        }
        Err(step_error) => {
            let (reason, service_status) = match step_error {
                StepError::HealthGate(reason) => (reason, ServiceStatus::Running),
                StepError::Fatal(e) => (e.to_string(), ServiceStatus::Failed),
            };
            logger.log(format!("Deployment failed: {reason}")).await;

            if let Err(e) =
                deployments::finish(&ctx.pool, deployment_id, DeploymentStatus::Failed, &logger.contents(), Utc::now())
                    .await
            {
                error!(deployment = %deployment_id, "Failed to record failure: {e}");
            }
            if let Err(e) = services::set_status(&ctx.pool, service_id, service_status).await {
                error!(service = %service_id, "Failed to update service status: {e}");
            }

            ctx.publisher
                .publish_best_effort(&Event::deployment_status(
                    deployment_id,
                    DeploymentStatus::Failed,
                    None,
                ))
                .await;
            ctx.publisher
                .publish_best_effort(&Event::service_status(service_id, service_status))
                .await;

            warn!(deployment = %deployment_id, %reason, "Deployment failed");
            DeploymentOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blue_green_requires_live_container_and_health_check() {
        assert_eq!(plan_strategy(true, true), RunStrategy::BlueGreen);
        assert_eq!(plan_strategy(true, false), RunStrategy::Traditional);
        assert_eq!(plan_strategy(false, true), RunStrategy::Traditional);
        assert_eq!(plan_strategy(false, false), RunStrategy::Traditional);
    }
}
