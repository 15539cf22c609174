//! Postgres execution repository.

use chrono::{DateTime, Utc};
use skillbox_core::repository::ExecutionRepository;
use skillbox_types::error::RepositoryError;
use skillbox_types::execution::{Execution, ExecutionStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// [`ExecutionRepository`] backed by the `executions` table.
#[derive(Debug, Clone)]
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_error(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn row_to_execution(row: &PgRow) -> Result<Execution, RepositoryError> {
    let status: String = row.try_get("status").map_err(query_error)?;
    let status: ExecutionStatus = status.parse().map_err(RepositoryError::Query)?;

    Ok(Execution {
        id: row.try_get::<Uuid, _>("id").map_err(query_error)?,
        skill_name: row.try_get("skill_name").map_err(query_error)?,
        skill_version: row.try_get("skill_version").map_err(query_error)?,
        tenant_id: row.try_get("tenant_id").map_err(query_error)?,
        status,
        input: row
            .try_get::<Option<serde_json::Value>, _>("input")
            .map_err(query_error)?,
        output: row
            .try_get::<Option<serde_json::Value>, _>("output")
            .map_err(query_error)?,
        logs: row.try_get("logs").map_err(query_error)?,
        files_url: row.try_get("files_url").map_err(query_error)?,
        files_list: row
            .try_get::<Vec<String>, _>("files_list")
            .map_err(query_error)?,
        duration_ms: row.try_get("duration_ms").map_err(query_error)?,
        error: row
            .try_get::<Option<String>, _>("error")
            .map_err(query_error)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(query_error)?,
        finished_at: row
            .try_get::<Option<DateTime<Utc>>, _>("finished_at")
            .map_err(query_error)?,
    })
}

impl ExecutionRepository for PgExecutionRepository {
    async fn create(&self, execution: &Execution) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO executions (id, skill_name, skill_version, tenant_id, status, input, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(execution.id)
        .bind(&execution.skill_name)
        .bind(&execution.skill_version)
        .bind(&execution.tenant_id)
        .bind(execution.status.to_string())
        .bind(&execution.input)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn complete(&self, execution: &Execution) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE executions
             SET status = $2,
                 output = $3,
                 logs = $4,
                 files_url = $5,
                 files_list = $6,
                 duration_ms = $7,
                 error = $8,
                 finished_at = $9
             WHERE id = $1 AND status = 'running'",
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(&execution.output)
        .bind(&execution.logs)
        .bind(&execution.files_url)
        .bind(&execution.files_list)
        .bind(execution.duration_ms)
        .bind(&execution.error)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(row_to_execution).transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let limit = if limit <= 0 { 20 } else { limit.min(100) };
        let offset = offset.max(0);

        let rows = sqlx::query(
            "SELECT * FROM executions
             WHERE tenant_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(row_to_execution).collect()
    }
}
