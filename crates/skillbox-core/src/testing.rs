//! In-memory fakes for tests.
//!
//! Mirrors the production ports without any backing service so unit and
//! integration tests can exercise the registry, collector, and runner
//! end-to-end. Not intended for production use.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use skillbox_types::error::{RepositoryError, StorageError};
use skillbox_types::execution::{Execution, ExecutionStatus};
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::repository::ExecutionRepository;
use crate::storage::{ObjectStore, StoredObject};

/// Build a zip archive from `(name, content)` pairs.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StoredEntry {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreInner {
    objects: BTreeMap<String, StoredEntry>,
    ticks: i64,
}

/// [`ObjectStore`] backed by a map. Upload timestamps are strictly
/// increasing so "latest" resolution is deterministic.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.ticks += 1;
        let last_modified = DateTime::from_timestamp(1_700_000_000 + inner.ticks, 0)
            .expect("timestamp in range");
        inner
            .objects
            .insert(key.to_string(), StoredEntry { data, last_modified });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let inner = self.inner.lock().expect("store lock");
        inner
            .objects
            .get(key)
            .map(|entry| entry.data.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| StoredObject {
                key: key.clone(),
                last_modified: entry.last_modified,
            })
            .collect())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let inner = self.inner.lock().expect("store lock");
        if !inner.objects.contains_key(key) {
            return Err(StorageError::NotFound);
        }
        Ok(format!("memory://{key}?expires={}s", ttl.as_secs()))
    }
}

// ---------------------------------------------------------------------------
// MemoryExecutionRepository
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RepoInner {
    rows: HashMap<Uuid, Execution>,
    completions: u64,
}

/// [`ExecutionRepository`] backed by a map, with the same conditional
/// completion semantics as the Postgres implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutionRepository {
    inner: Arc<Mutex<RepoInner>>,
}

impl MemoryExecutionRepository {
    /// Number of completion updates that actually matched a running row.
    pub fn applied_completions(&self) -> u64 {
        self.inner.lock().expect("repo lock").completions
    }

    /// Snapshot of a stored record, for assertions.
    pub fn snapshot(&self, id: Uuid) -> Option<Execution> {
        self.inner.lock().expect("repo lock").rows.get(&id).cloned()
    }

    /// Total number of stored records.
    pub fn row_count(&self) -> usize {
        self.inner.lock().expect("repo lock").rows.len()
    }
}

impl ExecutionRepository for MemoryExecutionRepository {
    async fn create(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().expect("repo lock");
        if inner.rows.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        inner.rows.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn complete(&self, execution: &Execution) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().expect("repo lock");
        let Some(row) = inner.rows.get_mut(&execution.id) else {
            return Ok(false);
        };
        if row.status != ExecutionStatus::Running {
            return Ok(false);
        }
        *row = execution.clone();
        inner.completions += 1;
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.inner.lock().expect("repo lock").rows.get(&id).cloned())
    }

    async fn list(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let limit = if limit <= 0 { 20 } else { limit.min(100) } as usize;
        let offset = offset.max(0) as usize;

        let inner = self.inner.lock().expect("repo lock");
        let mut rows: Vec<Execution> = inner
            .rows
            .values()
            .filter(|row| row.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}
