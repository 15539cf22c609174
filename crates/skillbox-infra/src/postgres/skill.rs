//! Postgres skill metadata repository.

use chrono::{DateTime, Utc};
use skillbox_core::repository::SkillRepository;
use skillbox_types::error::RepositoryError;
use skillbox_types::skill::{Language, SkillRecord};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// [`SkillRepository`] backed by the `skills` table.
#[derive(Debug, Clone)]
pub struct PgSkillRepository {
    pool: PgPool,
}

impl PgSkillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_error(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn row_to_record(row: &PgRow) -> Result<SkillRecord, RepositoryError> {
    let lang: String = row.try_get("lang").map_err(query_error)?;
    let lang: Language = lang.parse().map_err(RepositoryError::Query)?;

    Ok(SkillRecord {
        tenant_id: row.try_get("tenant_id").map_err(query_error)?,
        name: row.try_get("name").map_err(query_error)?,
        version: row.try_get("version").map_err(query_error)?,
        description: row.try_get("description").map_err(query_error)?,
        lang,
        uploaded_at: row
            .try_get::<DateTime<Utc>, _>("uploaded_at")
            .map_err(query_error)?,
    })
}

impl SkillRepository for PgSkillRepository {
    async fn upsert(&self, record: &SkillRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO skills (tenant_id, name, version, description, lang, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, now())
             ON CONFLICT (tenant_id, name, version)
             DO UPDATE SET description = EXCLUDED.description,
                           lang = EXCLUDED.lang,
                           uploaded_at = now()",
        )
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(&record.version)
        .bind(&record.description)
        .bind(record.lang.to_string())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<SkillRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, name, version, description, lang, uploaded_at
             FROM skills
             WHERE tenant_id = $1 AND name = $2 AND version = $3",
        )
        .bind(tenant_id)
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<SkillRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tenant_id, name, version, description, lang, uploaded_at
             FROM skills
             WHERE tenant_id = $1
             ORDER BY name, version",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn delete(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM skills WHERE tenant_id = $1 AND name = $2 AND version = $3",
        )
        .bind(tenant_id)
        .bind(name)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
