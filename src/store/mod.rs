//! Relational store access
//!
//! Repositories are free async functions over a `PgPool`, one module per
//! entity. Migrations are embedded and applied at startup; reapplying is a
//! no-op.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::errors::CoreError;

pub mod deployments;
pub mod domains;
pub mod services;

/// Embedded migrations for the core schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connect to the relational store and apply pending migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, CoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| CoreError::Database(e.into()))?;

    Ok(pool)
}
