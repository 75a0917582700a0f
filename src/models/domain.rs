//! Custom hostnames bound to services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A custom hostname bound to a service. Only verified domains participate
/// in routing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Domain {
    pub id: Uuid,
    pub service_id: Uuid,
    pub hostname: String,
    pub verified: bool,
    pub verification_token: String,
    pub created_at: DateTime<Utc>,
}
