//! Execution repository trait definition.

use skillbox_types::error::RepositoryError;
use skillbox_types::execution::Execution;
use uuid::Uuid;

/// Persistence port for execution records.
///
/// Implementations live in skillbox-infra (e.g. `PgExecutionRepository`).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new record. The record arrives in `running` state with a
    /// pre-generated id and creation timestamp.
    fn create(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Write the terminal fields for a record, conditional on it still
    /// being `running`. Returns `false` when no running row matched, which
    /// makes late or duplicate completions no-ops.
    fn complete(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Fetch a record by id.
    fn get(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// List a tenant's records, newest first. `limit` defaults to 20 and is
    /// capped at 100; negative offsets are floored at 0.
    fn list(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;
}
