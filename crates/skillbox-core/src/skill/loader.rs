//! Skill loading: download, extract, validate.
//!
//! Turns a stored archive into a [`LoadedSkill`]: a parsed manifest plus an
//! exclusively-owned private directory holding the extracted files, the
//! resolved entrypoint, and flags for dependency files.

use std::path::{Path, PathBuf};

use skillbox_types::error::RunError;
use skillbox_types::skill::{MANIFEST_FILE, SkillSpec};
use tempfile::TempDir;

use crate::archive::extract_zip;
use crate::registry::SkillRegistry;
use crate::skill::manifest::parse_manifest;
use crate::storage::ObjectStore;

/// Accepted entrypoint filenames, in priority order.
const ENTRYPOINTS: [&str; 4] = ["main.py", "run.py", "main.js", "main.sh"];

/// A fully validated skill extracted onto the local filesystem.
///
/// The private directory is removed when the value is dropped, which
/// covers every exit path of the runner.
#[derive(Debug)]
pub struct LoadedSkill {
    pub spec: SkillSpec,
    dir: TempDir,
    /// Path of the entrypoint script relative to [`Self::dir`].
    pub entrypoint: String,
    /// `requirements.txt` present at the extraction root.
    pub has_requirements: bool,
    /// `package.json` present at the extraction root.
    pub has_package_json: bool,
}

impl LoadedSkill {
    /// The private directory containing the extracted skill files.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Download a skill archive, extract it into a fresh private directory,
/// and validate its contents.
///
/// Missing archives surface as [`RunError::SkillNotFound`]; a missing
/// manifest or entrypoint (and any traversal entry) as
/// [`RunError::InvalidSkill`]. The temp directory is cleaned up on every
/// failure path; on success its ownership transfers into the returned
/// [`LoadedSkill`].
pub async fn load_skill<S: ObjectStore>(
    registry: &SkillRegistry<S>,
    tenant_id: &str,
    name: &str,
    version: &str,
) -> Result<LoadedSkill, RunError> {
    let data = registry.download(tenant_id, name, version).await?;

    let dir = tempfile::Builder::new()
        .prefix("skillbox-skill-")
        .tempdir()?;

    extract_zip(&data, dir.path())?;

    let manifest_path = dir.path().join(MANIFEST_FILE);
    let raw = match std::fs::read_to_string(&manifest_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RunError::InvalidSkill(format!(
                "{MANIFEST_FILE} not found in archive"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let spec = parse_manifest(&raw)
        .map_err(|e| RunError::InvalidSkill(format!("parsing {MANIFEST_FILE}: {e}")))?;

    let entrypoint = find_entrypoint(dir.path()).ok_or_else(|| {
        RunError::InvalidSkill(format!(
            "no recognized entrypoint found in archive (expected one of: {})",
            ENTRYPOINTS.join(", ")
        ))
    })?;

    let has_requirements = is_file(&dir.path().join("requirements.txt"));
    let has_package_json = is_file(&dir.path().join("package.json"));

    Ok(LoadedSkill {
        spec,
        dir,
        entrypoint,
        has_requirements,
        has_package_json,
    })
}

/// Search for a recognized entrypoint script, first at the extraction
/// root and then under `scripts/`.
fn find_entrypoint(dir: &Path) -> Option<String> {
    for name in ENTRYPOINTS {
        if is_file(&dir.join(name)) {
            return Some(name.to_string());
        }
    }
    for name in ENTRYPOINTS {
        let candidate = PathBuf::from("scripts").join(name);
        if is_file(&dir.join(&candidate)) {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryObjectStore, zip_archive};
    use skillbox_types::skill::Language;

    const MANIFEST: &[u8] = b"---\nname: echo\nversion: 1.0.0\ndescription: Echo the input\nlang: python\n---\n\nEcho the input back.\n";

    fn registry() -> SkillRegistry<MemoryObjectStore> {
        SkillRegistry::new(MemoryObjectStore::default(), 50 * 1024 * 1024)
    }

    async fn upload(registry: &SkillRegistry<MemoryObjectStore>, entries: &[(&str, &[u8])]) {
        registry
            .upload("acme", "echo", "1.0.0", zip_archive(entries))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loads_a_valid_skill() {
        let registry = registry();
        upload(
            &registry,
            &[
                ("SKILL.md", MANIFEST),
                ("main.py", b"print('ok')"),
                ("requirements.txt", b"requests==2.31.0\n"),
            ],
        )
        .await;

        let loaded = load_skill(&registry, "acme", "echo", "1.0.0").await.unwrap();

        assert_eq!(loaded.spec.name, "echo");
        assert_eq!(loaded.spec.language, Language::Python);
        assert_eq!(loaded.entrypoint, "main.py");
        assert!(loaded.has_requirements);
        assert!(!loaded.has_package_json);
        assert!(loaded.dir().join("main.py").is_file());
    }

    #[tokio::test]
    async fn missing_archive_is_skill_not_found() {
        let registry = registry();
        let err = load_skill(&registry, "acme", "echo", "9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::SkillNotFound));
    }

    #[tokio::test]
    async fn missing_manifest_is_invalid_skill() {
        let registry = registry();
        upload(&registry, &[("main.py", b"print('ok')")]).await;

        let err = load_skill(&registry, "acme", "echo", "1.0.0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SKILL.md not found"));
    }

    #[tokio::test]
    async fn missing_entrypoint_is_invalid_skill() {
        let registry = registry();
        upload(&registry, &[("SKILL.md", MANIFEST), ("helper.py", b"pass")]).await;

        let err = load_skill(&registry, "acme", "echo", "1.0.0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no recognized entrypoint"));
    }

    #[tokio::test]
    async fn entrypoint_priority_prefers_main_py() {
        let registry = registry();
        upload(
            &registry,
            &[
                ("SKILL.md", MANIFEST),
                ("run.py", b"pass"),
                ("main.py", b"pass"),
            ],
        )
        .await;

        let loaded = load_skill(&registry, "acme", "echo", "1.0.0").await.unwrap();
        assert_eq!(loaded.entrypoint, "main.py");
    }

    #[tokio::test]
    async fn entrypoint_found_under_scripts_dir() {
        let registry = registry();
        upload(
            &registry,
            &[("SKILL.md", MANIFEST), ("scripts/main.sh", b"echo hi")],
        )
        .await;

        let loaded = load_skill(&registry, "acme", "echo", "1.0.0").await.unwrap();
        assert_eq!(loaded.entrypoint, "scripts/main.sh");
    }

    #[tokio::test]
    async fn root_entrypoint_wins_over_scripts_dir() {
        let registry = registry();
        upload(
            &registry,
            &[
                ("SKILL.md", MANIFEST),
                ("main.sh", b"echo root"),
                ("scripts/main.py", b"pass"),
            ],
        )
        .await;

        let loaded = load_skill(&registry, "acme", "echo", "1.0.0").await.unwrap();
        // Root entries take priority over scripts/ regardless of filename order.
        assert_eq!(loaded.entrypoint, "main.sh");
    }

    #[tokio::test]
    async fn traversal_entry_fails_the_load() {
        let registry = registry();
        upload(
            &registry,
            &[
                ("SKILL.md", MANIFEST),
                ("main.py", b"pass"),
                ("../escape.py", b"pass"),
            ],
        )
        .await;

        let err = load_skill(&registry, "acme", "echo", "1.0.0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("illegal path"));
    }

    #[tokio::test]
    async fn invalid_manifest_reports_violations() {
        let registry = registry();
        upload(
            &registry,
            &[("SKILL.md", b"---\nname: bad\n---\nbody"), ("main.py", b"pass")],
        )
        .await;

        let err = load_skill(&registry, "acme", "echo", "1.0.0")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("version is required"));
        assert!(message.contains("lang is required"));
    }
}
