//! Metrics-sampling worker
//!
//! Samples container stats for every service with at least one live
//! `service:<id>` subscriber and publishes `service:metrics` events. A
//! sample hitting a vanished container flips the service to STOPPED; the
//! sampler stops visiting it once the pointer is cleared.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::docker::ContainerRuntime;
use crate::errors::CoreError;
use crate::events::{Event, EventPublisher, SubscriptionHub};
use crate::models::ServiceStatus;
use crate::store::services;

/// Metrics worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sampling interval.
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Run the sampler until shutdown.
pub async fn run(
    options: &Options,
    pool: PgPool,
    runtime: Arc<dyn ContainerRuntime>,
    hub: Arc<SubscriptionHub>,
    publisher: EventPublisher,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Metrics sampler starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Metrics sampler shutting down...");
                return;
            }
            _ = tokio::time::sleep(options.interval) => {}
        }

        for service_id in hub.watched_service_ids() {
            let service = match services::get(&pool, service_id).await {
                Ok(Some(service)) => service,
                Ok(None) => continue,
                Err(e) => {
                    warn!(service = %service_id, "Failed to load watched service: {e}");
                    continue;
                }
            };
            let Some(container_id) = &service.container_id else {
                continue;
            };

            match runtime.stats(container_id).await {
                Ok(stats) => {
                    publisher
                        .publish_best_effort(&Event::service_metrics(service_id, stats))
                        .await;
                }
                Err(CoreError::Integrity(_)) => {
                    // Container is gone; repair the row and tell subscribers.
                    debug!(service = %service_id, "Watched container vanished, marking stopped");
                    if let Err(e) =
                        services::detach_container(&pool, service_id, ServiceStatus::Stopped).await
                    {
                        warn!(service = %service_id, "Failed to mark service stopped: {e}");
                        continue;
                    }
                    publisher
                        .publish_best_effort(&Event::service_status(
                            service_id,
                            ServiceStatus::Stopped,
                        ))
                        .await;
                }
                Err(e) => {
                    warn!(service = %service_id, "Stats sample failed: {e}");
                }
            }
        }
    }
}
