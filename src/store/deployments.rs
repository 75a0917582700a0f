//! Deployment repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::{Deployment, DeploymentStatus};

const SELECT_COLUMNS: &str = r#"
    SELECT id, service_id, status, commit_sha, image_tag, logs,
           started_at, finished_at, created_at
    FROM deployments
"#;

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Deployment>, CoreError> {
    let deployment =
        sqlx::query_as::<_, Deployment>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(deployment)
}

/// Insert a fresh QUEUED deployment row.
pub async fn insert(pool: &PgPool, deployment: &Deployment) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO deployments (id, service_id, status, commit_sha, image_tag,
                                 logs, started_at, finished_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(deployment.id)
    .bind(deployment.service_id)
    .bind(deployment.status)
    .bind(&deployment.commit_sha)
    .bind(&deployment.image_tag)
    .bind(&deployment.logs)
    .bind(deployment.started_at)
    .bind(deployment.finished_at)
    .bind(deployment.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a deployment to BUILDING and stamp `started_at`.
pub async fn mark_building(
    pool: &PgPool,
    id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE deployments SET status = 'BUILDING', started_at = $2 WHERE id = $1")
        .bind(id)
        .bind(started_at)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_commit_sha(pool: &PgPool, id: Uuid, commit_sha: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE deployments SET commit_sha = $2 WHERE id = $1")
        .bind(id)
        .bind(commit_sha)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record the image tag as soon as the build succeeds (rollback depends on it).
pub async fn set_image_tag(pool: &PgPool, id: Uuid, image_tag: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE deployments SET image_tag = $2 WHERE id = $1")
        .bind(id)
        .bind(image_tag)
        .execute(pool)
        .await?;

    Ok(())
}

/// Write the terminal status together with the accumulated log text.
pub async fn finish(
    pool: &PgPool,
    id: Uuid,
    status: DeploymentStatus,
    logs: &str,
    finished_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE deployments
        SET status = $2, logs = $3, finished_at = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(logs)
    .bind(finished_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Newest-first deployment history for one service.
pub async fn list_for_service(
    pool: &PgPool,
    service_id: Uuid,
) -> Result<Vec<Deployment>, CoreError> {
    let deployments = sqlx::query_as::<_, Deployment>(&format!(
        "{SELECT_COLUMNS} WHERE service_id = $1 ORDER BY created_at DESC"
    ))
    .bind(service_id)
    .fetch_all(pool)
    .await?;

    Ok(deployments)
}

/// Delete all but the `keep` most recent deployments of a service. Returns
/// the number of rows removed.
pub async fn trim_history(pool: &PgPool, service_id: Uuid, keep: i64) -> Result<u64, CoreError> {
    let result = sqlx::query(
        r#"
        DELETE FROM deployments
        WHERE service_id = $1
          AND id NOT IN (
              SELECT id FROM deployments
              WHERE service_id = $1
              ORDER BY created_at DESC
              LIMIT $2
          )
        "#,
    )
    .bind(service_id)
    .bind(keep)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
