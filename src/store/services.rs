//! Service repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::{Service, ServiceStatus};

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Service>, CoreError> {
    let service = sqlx::query_as::<_, Service>(
        r#"
        SELECT id, name, project_id, repo_url, branch, runtime_hint, subdomain,
               status, container_id, env_vars, health_check_path,
               health_check_interval_secs, health_check_timeout_secs,
               webhook_secret, created_at, updated_at
        FROM services
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(service)
}

pub async fn insert(pool: &PgPool, service: &Service) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO services (id, name, project_id, repo_url, branch, runtime_hint,
                              subdomain, status, container_id, env_vars,
                              health_check_path, health_check_interval_secs,
                              health_check_timeout_secs, webhook_secret,
                              created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(service.id)
    .bind(&service.name)
    .bind(service.project_id)
    .bind(&service.repo_url)
    .bind(&service.branch)
    .bind(&service.runtime_hint)
    .bind(&service.subdomain)
    .bind(service.status)
    .bind(&service.container_id)
    .bind(&service.env_vars)
    .bind(&service.health_check_path)
    .bind(service.health_check_interval_secs)
    .bind(service.health_check_timeout_secs)
    .bind(&service.webhook_secret)
    .bind(service.created_at)
    .bind(service.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether a subdomain is already taken. The unique constraint is the final
/// arbiter; this pre-check keeps the generate-and-retry loop cheap.
pub async fn subdomain_taken(pool: &PgPool, subdomain: &str) -> Result<bool, CoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services WHERE subdomain = $1")
        .bind(subdomain)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn set_status(pool: &PgPool, id: Uuid, status: ServiceStatus) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE services SET status = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound(format!("service {id}")));
    }

    Ok(())
}

/// Point the service at its new live container and mark it RUNNING.
pub async fn mark_running(pool: &PgPool, id: Uuid, container_id: &str) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE services
        SET status = 'RUNNING', container_id = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(container_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Detach the container pointer, recording the given terminal status.
pub async fn detach_container(
    pool: &PgPool,
    id: Uuid,
    status: ServiceStatus,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE services
        SET status = $2, container_id = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(())
}

/// Services holding a container pointer, for drift detection.
pub async fn list_with_containers(pool: &PgPool) -> Result<Vec<Service>, CoreError> {
    let services = sqlx::query_as::<_, Service>(
        r#"
        SELECT id, name, project_id, repo_url, branch, runtime_hint, subdomain,
               status, container_id, env_vars, health_check_path,
               health_check_interval_secs, health_check_timeout_secs,
               webhook_secret, created_at, updated_at
        FROM services
        WHERE container_id IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(services)
}

/// FAILED services whose container outlived the given cutoff, for reaping.
pub async fn list_failed_with_containers_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Service>, CoreError> {
    let services = sqlx::query_as::<_, Service>(
        r#"
        SELECT id, name, project_id, repo_url, branch, runtime_hint, subdomain,
               status, container_id, env_vars, health_check_path,
               health_check_interval_secs, health_check_timeout_secs,
               webhook_secret, created_at, updated_at
        FROM services
        WHERE status = 'FAILED' AND container_id IS NOT NULL AND updated_at < $1
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(services)
}

/// All service ids, for per-service history trimming.
pub async fn list_ids(pool: &PgPool) -> Result<Vec<Uuid>, CoreError> {
    let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM services")
        .fetch_all(pool)
        .await?;

    Ok(ids)
}
