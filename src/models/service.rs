//! Service — the deployable unit

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Lifecycle status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Created,
    Deploying,
    Running,
    Stopped,
    Failed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Deploying => "DEPLOYING",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }
}

/// A deployable unit bound to a single repository and branch.
///
/// Invariants: at any stable (non-DEPLOYING) moment a service has zero or one
/// live container; `status == Running` implies `container_id` refers to a
/// container up on the managed network; `subdomain` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub project_id: Uuid,
    /// Canonical repository URL, normalized (no trailing `.git`).
    pub repo_url: String,
    pub branch: String,
    pub runtime_hint: Option<String>,
    /// Hostname label under the base domain. Immutable after creation.
    pub subdomain: String,
    pub status: ServiceStatus,
    pub container_id: Option<String>,
    /// Env map, each value an encrypted envelope (`iv:tag:ciphertext` hex).
    pub env_vars: Json<HashMap<String, String>>,
    pub health_check_path: Option<String>,
    pub health_check_interval_secs: Option<i32>,
    pub health_check_timeout_secs: Option<i32>,
    pub webhook_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Whether deployments of this service are gated on a health check.
    pub fn has_health_check(&self) -> bool {
        self.health_check_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ServiceStatus::Created,
            ServiceStatus::Deploying,
            ServiceStatus::Running,
            ServiceStatus::Stopped,
            ServiceStatus::Failed,
        ] {
            let s = serde_json::to_string(&status).unwrap();
            assert_eq!(s, format!("\"{}\"", status.as_str()));
        }
    }
}
