//! Domain repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::Domain;

/// Verified custom hostnames for a service; only these participate in routing.
pub async fn list_verified(pool: &PgPool, service_id: Uuid) -> Result<Vec<Domain>, CoreError> {
    let domains = sqlx::query_as::<_, Domain>(
        r#"
        SELECT id, service_id, hostname, verified, verification_token, created_at
        FROM domains
        WHERE service_id = $1 AND verified = TRUE
        ORDER BY created_at
        "#,
    )
    .bind(service_id)
    .fetch_all(pool)
    .await?;

    Ok(domains)
}
