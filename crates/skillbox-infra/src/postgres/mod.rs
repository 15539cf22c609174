//! Postgres-backed repositories.
//!
//! Implements the repository ports from `skillbox-core` with sqlx.
//! Migrations live at the workspace root and are applied in order at
//! startup; each is idempotent.

pub mod execution;
pub mod skill;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use execution::PgExecutionRepository;
pub use skill::PgSkillRepository;

/// Open a connection pool, verify connectivity, and run all pending
/// migrations.
pub async fn connect(dsn: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    Ok(pool)
}
