//! Queue payloads — the immutable plans workers execute

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health-check parameters carried into a job, resolved from the service row
/// at job-construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckParams {
    /// Request path, e.g. `/healthz`.
    pub path: String,
    /// Seconds between the platform's own periodic probes.
    pub interval_secs: Option<u32>,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: Option<u32>,
}

/// The immutable plan a build worker executes. The env map is decrypted at
/// construction and exists only in worker memory and on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentJob {
    pub deployment_id: Uuid,
    pub service_id: Uuid,
    pub repo_url: String,
    pub branch: String,
    pub subdomain: String,
    pub env: HashMap<String, String>,
    /// Source-control token injected into the clone URL. Never logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckParams>,
}

/// Rollback plan: reuses a previously built image, no clone or build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackJob {
    pub deployment_id: Uuid,
    pub service_id: Uuid,
    pub image_tag: String,
    pub subdomain: String,
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckParams>,
}
