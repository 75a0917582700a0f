//! Container runtime controller
//!
//! Thin, typed wrapper over the container runtime daemon. The pipeline and
//! the background sweeps talk to the runtime exclusively through the
//! [`ContainerRuntime`] trait; [`DockerRuntime`] is the production
//! implementation over the local daemon socket.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::errors::CoreError;

pub mod health;
pub mod labels;
pub mod stats;

pub use stats::ContainerStats;

/// Memory cap for managed containers (512 MiB).
const MEMORY_LIMIT_BYTES: i64 = 512 * 1024 * 1024;
/// CPU cap for managed containers (0.5 cores, in nano-cpus).
const NANO_CPUS: i64 = 500_000_000;
/// Grace period for container stops.
const STOP_GRACE_SECS: i64 = 10;

/// Canonical name of a service's live container.
pub fn container_name(subdomain: &str) -> String {
    format!("renderlite-{subdomain}")
}

/// Name of the staging container during a blue/green swap.
pub fn staging_name(subdomain: &str) -> String {
    format!("{}-new", container_name(subdomain))
}

/// Everything needed to create and start one managed container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image_tag: String,
    pub subdomain: String,
    pub env: HashMap<String, String>,
    pub container_port: u16,
    /// Verified custom hostnames that should also route here.
    pub custom_domains: Vec<String>,
    /// Overrides the canonical `renderlite-<subdomain>` name (staging).
    pub name_override: Option<String>,
}

/// A platform-owned container as reported by the runtime.
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub state: String,
    pub subdomain: Option<String>,
}

/// The seam between the control plane and the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container, replacing any existing holder of the
    /// target name. Returns the new container id.
    async fn run(&self, spec: &RunSpec) -> Result<String, CoreError>;

    /// Graceful stop, tolerating an already-stopped container.
    async fn stop(&self, id: &str) -> Result<(), CoreError>;

    /// Best-effort stop followed by a forced remove. Idempotent.
    async fn remove(&self, id: &str) -> Result<(), CoreError>;

    /// Address of the container on the managed network.
    async fn ip(&self, id: &str) -> Result<String, CoreError>;

    /// One-shot resource sample.
    async fn stats(&self, id: &str) -> Result<ContainerStats, CoreError>;

    /// Whether the runtime reports the container as running. A missing
    /// container counts as not running.
    async fn is_running(&self, id: &str) -> Result<bool, CoreError>;

    /// All containers bearing the platform label, in any state.
    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, CoreError>;

    /// Remove every managed container in `exited` state. Returns how many
    /// were reaped.
    async fn reap_exited(&self) -> Result<u32, CoreError>;
}

/// Production implementation over the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    network: String,
    base_domain: String,
    enable_tls: bool,
}

impl DockerRuntime {
    pub fn connect(network: &str, base_domain: &str, enable_tls: bool) -> Result<Self, CoreError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| CoreError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self {
            docker,
            network: network.to_string(),
            base_domain: base_domain.to_string(),
            enable_tls,
        })
    }

    fn managed_filters() -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}=true", labels::MANAGED_LABEL)],
        );
        filters
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
    )
}

fn is_not_modified(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, spec: &RunSpec) -> Result<String, CoreError> {
        let name = spec
            .name_override
            .clone()
            .unwrap_or_else(|| container_name(&spec.subdomain));

        // A previous holder of the name blocks creation; replace it.
        match self.docker.inspect_container(&name, None).await {
            Ok(existing) => {
                let id = existing.id.unwrap_or_else(|| name.clone());
                info!(container = %name, "Replacing existing container");
                self.stop(&id).await.ok();
                self.remove(&id).await?;
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let route = labels::RouteSpec {
            container_name: &name,
            subdomain: &spec.subdomain,
            base_domain: &self.base_domain,
            custom_domains: &spec.custom_domains,
            container_port: spec.container_port,
            network: &self.network,
            enable_tls: self.enable_tls,
        };

        let config = Config {
            image: Some(spec.image_tag.clone()),
            env: Some(env),
            labels: Some(labels::routing_labels(&route)),
            host_config: Some(HostConfig {
                memory: Some(MEMORY_LIMIT_BYTES),
                nano_cpus: Some(NANO_CPUS),
                network_mode: Some(self.network.clone()),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions { name: name.clone(), platform: None }),
                config,
            )
            .await?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;

        info!(container = %name, id = %created.id, image = %spec.image_tag, "Container started");
        Ok(created.id)
    }

    async fn stop(&self, id: &str) -> Result<(), CoreError> {
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), CoreError> {
        self.stop(id).await.ok();
        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions { force: true, ..Default::default() }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ip(&self, id: &str) -> Result<String, CoreError> {
        let inspected = self.docker.inspect_container(id, None).await?;

        let address = inspected
            .network_settings
            .and_then(|settings| settings.networks)
            .and_then(|mut networks| networks.remove(&self.network))
            .and_then(|endpoint| endpoint.ip_address)
            .filter(|ip| !ip.is_empty());

        address.ok_or_else(|| {
            CoreError::Integrity(format!(
                "container {id} has no address on network {}",
                self.network
            ))
        })
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats, CoreError> {
        let mut stream = self
            .docker
            .stats(id, Some(StatsOptions { stream: false, one_shot: false }));

        let sample = stream
            .next()
            .await
            .ok_or_else(|| CoreError::RuntimeUnavailable("empty stats stream".to_string()))??;

        let (network_rx, network_tx) = sample
            .networks
            .as_ref()
            .map(|interfaces| {
                interfaces.values().fold((0u64, 0u64), |(rx, tx), net| {
                    (rx + net.rx_bytes, tx + net.tx_bytes)
                })
            })
            .unwrap_or((0, 0));

        let raw = stats::RawSample {
            cpu_total: sample.cpu_stats.cpu_usage.total_usage,
            cpu_system: sample.cpu_stats.system_cpu_usage.unwrap_or(0),
            precpu_total: sample.precpu_stats.cpu_usage.total_usage,
            precpu_system: sample.precpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpus: sample.cpu_stats.online_cpus.unwrap_or(1),
            memory_usage: sample.memory_stats.usage.unwrap_or(0),
            memory_limit: sample.memory_stats.limit.unwrap_or(0),
            network_rx,
            network_tx,
        };

        Ok(stats::compute(&raw))
    }

    async fn is_running(&self, id: &str) -> Result<bool, CoreError> {
        match self.docker.inspect_container(id, None).await {
            Ok(inspected) => Ok(inspected
                .state
                .and_then(|state| state.running)
                .unwrap_or(false)),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, CoreError> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: Self::managed_filters(),
                ..Default::default()
            }))
            .await?;

        let containers = summaries
            .into_iter()
            .filter_map(|summary| {
                let id = summary.id?;
                let name = summary
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                let subdomain = summary
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(labels::SUBDOMAIN_LABEL))
                    .cloned();
                Some(ManagedContainer {
                    id,
                    name,
                    state: summary.state.unwrap_or_default(),
                    subdomain,
                })
            })
            .collect();

        Ok(containers)
    }

    async fn reap_exited(&self) -> Result<u32, CoreError> {
        let mut filters = Self::managed_filters();
        filters.insert("status".to_string(), vec!["exited".to_string()]);

        let exited = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut reaped = 0;
        for summary in exited {
            let Some(id) = summary.id else { continue };
            match self.remove(&id).await {
                Ok(()) => reaped += 1,
                Err(e) => warn!(container = %id, "Failed to reap exited container: {e}"),
            }
        }

        if reaped > 0 {
            debug!(reaped, "Reaped exited managed containers");
        }
        Ok(reaped)
    }
}
