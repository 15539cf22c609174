//! Skill archive registry.
//!
//! Archives are stored in the object store as zip files keyed by tenant,
//! skill name, and version: `{tenant}/{name}/{version}/skill.zip`. The
//! registry validates archives on upload and resolves "latest" to the most
//! recently uploaded version.

use std::io::Cursor;

use skillbox_types::error::{RunError, StorageError};
use skillbox_types::skill::SkillMeta;

use crate::storage::ObjectStore;

const ARCHIVE_SUFFIX: &str = "/skill.zip";

/// Skill archive storage over an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct SkillRegistry<S> {
    store: S,
    max_archive_bytes: usize,
}

impl<S: ObjectStore> SkillRegistry<S> {
    pub fn new(store: S, max_archive_bytes: usize) -> Self {
        Self {
            store,
            max_archive_bytes,
        }
    }

    fn object_key(tenant_id: &str, name: &str, version: &str) -> String {
        format!("{tenant_id}/{name}/{version}{ARCHIVE_SUFFIX}")
    }

    fn require_ids(parts: &[&str]) -> Result<(), RunError> {
        if parts.iter().any(|part| part.is_empty()) {
            return Err(RunError::InvalidSkill(
                "tenant, skill name, and version are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Store a skill zip archive after validating the size cap and that the
    /// bytes really are a zip. Idempotent by key.
    pub async fn upload(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
        data: Vec<u8>,
    ) -> Result<(), RunError> {
        Self::require_ids(&[tenant_id, name, version])?;

        if data.len() > self.max_archive_bytes {
            return Err(RunError::InvalidSkill(format!(
                "archive is {} bytes, exceeding the {} byte limit",
                data.len(),
                self.max_archive_bytes
            )));
        }

        // Reject corrupt uploads before they reach storage.
        zip::ZipArchive::new(Cursor::new(&data))
            .map_err(|e| RunError::InvalidSkill(format!("invalid zip archive: {e}")))?;

        let key = Self::object_key(tenant_id, name, version);
        self.store.put(&key, data, "application/zip").await?;
        Ok(())
    }

    /// Fetch a skill archive's bytes.
    pub async fn download(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
    ) -> Result<Vec<u8>, RunError> {
        Self::require_ids(&[tenant_id, name, version])?;

        let key = Self::object_key(tenant_id, name, version);
        match self.store.get(&key).await {
            Ok(data) => Ok(data),
            Err(StorageError::NotFound) => Err(RunError::SkillNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a skill archive. Missing archives surface as
    /// [`RunError::SkillNotFound`].
    pub async fn delete(
        &self,
        tenant_id: &str,
        name: &str,
        version: &str,
    ) -> Result<(), RunError> {
        Self::require_ids(&[tenant_id, name, version])?;

        let key = Self::object_key(tenant_id, name, version);
        match self.store.delete(&key).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(RunError::SkillNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the most recently uploaded version of a skill.
    pub async fn resolve_latest(&self, tenant_id: &str, name: &str) -> Result<String, RunError> {
        Self::require_ids(&[tenant_id, name])?;

        let prefix = format!("{tenant_id}/{name}/");
        let objects = self.store.list(&prefix).await?;

        let latest = objects
            .iter()
            .filter(|object| object.key.ends_with(ARCHIVE_SUFFIX))
            .max_by_key(|object| object.last_modified)
            .map(|object| {
                object.key[prefix.len()..object.key.len() - ARCHIVE_SUFFIX.len()].to_string()
            });

        latest.ok_or(RunError::SkillNotFound)
    }

    /// Metadata for every skill version belonging to a tenant, derived from
    /// the object keys under the tenant's namespace.
    pub async fn list(&self, tenant_id: &str) -> Result<Vec<SkillMeta>, RunError> {
        Self::require_ids(&[tenant_id])?;

        let prefix = format!("{tenant_id}/");
        let objects = self.store.list(&prefix).await?;

        let mut skills = Vec::new();
        for object in objects {
            let Some(relative) = object
                .key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(ARCHIVE_SUFFIX))
            else {
                continue;
            };

            // Expected: {name}/{version}
            let Some((name, version)) = relative.split_once('/') else {
                continue;
            };
            if name.is_empty() || version.is_empty() || version.contains('/') {
                continue;
            }

            skills.push(SkillMeta {
                name: name.to_string(),
                version: version.to_string(),
                uploaded_at: object.last_modified,
            });
        }

        Ok(skills)
    }
}
