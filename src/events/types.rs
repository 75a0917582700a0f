//! Event shapes delivered to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::docker::ContainerStats;
use crate::models::{DeploymentStatus, ServiceStatus};

/// Resource sample as delivered on the `service:<id>` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    #[serde(flatten)]
    pub stats: ContainerStats,
    pub timestamp: DateTime<Utc>,
}

/// Everything the realtime channel carries. Encoded as tagged JSON; the
/// field names are the contract with subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "deployment:log")]
    #[serde(rename_all = "camelCase")]
    DeploymentLog {
        deployment_id: Uuid,
        log: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "deployment:status")]
    #[serde(rename_all = "camelCase")]
    DeploymentStatus {
        deployment_id: Uuid,
        status: DeploymentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        container_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "service:status")]
    #[serde(rename_all = "camelCase")]
    ServiceStatus {
        service_id: Uuid,
        status: ServiceStatus,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "service:metrics")]
    #[serde(rename_all = "camelCase")]
    ServiceMetrics {
        service_id: Uuid,
        metrics: MetricsPayload,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "user:notification")]
    #[serde(rename_all = "camelCase")]
    UserNotification {
        user_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn deployment_log(deployment_id: Uuid, log: impl Into<String>) -> Self {
        Self::DeploymentLog {
            deployment_id,
            log: log.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn deployment_status(
        deployment_id: Uuid,
        status: DeploymentStatus,
        container_id: Option<String>,
    ) -> Self {
        Self::DeploymentStatus {
            deployment_id,
            status,
            container_id,
            timestamp: Utc::now(),
        }
    }

    pub fn service_status(service_id: Uuid, status: ServiceStatus) -> Self {
        Self::ServiceStatus {
            service_id,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn service_metrics(service_id: Uuid, stats: ContainerStats) -> Self {
        let timestamp = Utc::now();
        Self::ServiceMetrics {
            service_id,
            metrics: MetricsPayload { stats, timestamp },
            timestamp,
        }
    }

    /// Topic room this event belongs to.
    pub fn topic(&self) -> String {
        match self {
            Self::DeploymentLog { deployment_id, .. }
            | Self::DeploymentStatus { deployment_id, .. } => {
                format!("deployment:{deployment_id}")
            }
            Self::ServiceStatus { service_id, .. } | Self::ServiceMetrics { service_id, .. } => {
                format!("service:{service_id}")
            }
            Self::UserNotification { user_id, .. } => format!("user:{user_id}"),
        }
    }
}
