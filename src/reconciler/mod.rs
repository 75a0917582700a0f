//! Reconciler — converges the store's view of the world with the runtime's
//!
//! Three independent sweeps: drift repair, deployment history trimming, and
//! failed-container reaping. The reconciler only touches containers in
//! terminal runtime states and deterministic names, so it never conflicts
//! with an active pipeline. Two consecutive sweeps with no external change
//! perform no writes.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::docker::ContainerRuntime;
use crate::errors::CoreError;
use crate::events::{Event, EventPublisher};
use crate::models::ServiceStatus;
use crate::store::{deployments, services};

/// Deployment rows retained per service.
const HISTORY_KEEP: i64 = 10;
/// Age after which a FAILED service's container is reaped.
const FAILED_CONTAINER_TTL_HOURS: i64 = 24;

pub struct Reconciler {
    pool: PgPool,
    runtime: Arc<dyn ContainerRuntime>,
    publisher: EventPublisher,
}

impl Reconciler {
    pub fn new(pool: PgPool, runtime: Arc<dyn ContainerRuntime>, publisher: EventPublisher) -> Self {
        Self {
            pool,
            runtime,
            publisher,
        }
    }

    /// One full pass. Sweeps are independent; a failing sweep is logged and
    /// the others still run.
    pub async fn run_sweeps(&self) {
        if let Err(e) = self.repair_drift().await {
            warn!("Drift sweep failed: {e}");
        }
        if let Err(e) = self.trim_history().await {
            warn!("History-trim sweep failed: {e}");
        }
        if let Err(e) = self.reap_failed().await {
            warn!("Failed-container sweep failed: {e}");
        }
    }

    /// Sweep 1: services that claim RUNNING but whose container is gone or
    /// stopped are flipped to STOPPED; then exited managed containers are
    /// removed.
    async fn repair_drift(&self) -> Result<(), CoreError> {
        let mut repaired = 0u32;

        for service in services::list_with_containers(&self.pool).await? {
            let Some(container_id) = &service.container_id else { continue };
            if service.status != ServiceStatus::Running {
                continue;
            }

            let running = self.runtime.is_running(container_id).await?;
            if !running {
                info!(service = %service.id, container = %container_id, "Repairing drifted service");
                services::detach_container(&self.pool, service.id, ServiceStatus::Stopped).await?;
                self.publisher
                    .publish_best_effort(&Event::service_status(service.id, ServiceStatus::Stopped))
                    .await;
                repaired += 1;
            }
        }

        let reaped = self.runtime.reap_exited().await?;
        if repaired > 0 || reaped > 0 {
            info!(repaired, reaped, "Drift sweep finished");
        }
        Ok(())
    }

    /// Sweep 2: keep the most recent deployment rows per service. Image tags
    /// are not deleted from the runtime; image GC is out of scope.
    async fn trim_history(&self) -> Result<(), CoreError> {
        let mut trimmed = 0u64;
        for service_id in services::list_ids(&self.pool).await? {
            trimmed += deployments::trim_history(&self.pool, service_id, HISTORY_KEEP).await?;
        }
        if trimmed > 0 {
            info!(trimmed, "Trimmed deployment history");
        }
        Ok(())
    }

    /// Sweep 3: FAILED services holding a container for longer than the TTL
    /// get the container removed and the pointer cleared.
    async fn reap_failed(&self) -> Result<(), CoreError> {
        let cutoff = Utc::now() - ChronoDuration::hours(FAILED_CONTAINER_TTL_HOURS);

        for service in services::list_failed_with_containers_before(&self.pool, cutoff).await? {
            let Some(container_id) = &service.container_id else { continue };
            info!(service = %service.id, container = %container_id, "Reaping failed service container");
            if let Err(e) = self.runtime.remove(container_id).await {
                warn!(container = %container_id, "Failed to remove container: {e}");
                continue;
            }
            services::detach_container(&self.pool, service.id, ServiceStatus::Failed).await?;
        }

        Ok(())
    }
}
