//! Skill metadata repository trait definition.

use skillbox_types::error::RepositoryError;
use skillbox_types::skill::SkillRecord;

/// Persistence port for skill metadata rows.
///
/// The object store holds the archives themselves; this table carries the
/// queryable metadata per uploaded `(tenant, name, version)`.
pub trait SkillRepository: Send + Sync {
    /// Insert or refresh a metadata row. A conflict on the primary key
    /// updates description, lang, and the upload timestamp.
    fn upsert(
        &self,
        record: &SkillRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
    ) -> impl std::future::Future<Output = Result<Option<SkillRecord>, RepositoryError>> + Send;

    /// All rows for a tenant, ordered by name then version.
    fn list(
        &self,
        tenant_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<SkillRecord>, RepositoryError>> + Send;

    fn delete(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
