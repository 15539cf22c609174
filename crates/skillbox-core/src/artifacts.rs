//! Artifact collection.
//!
//! Packages the files a skill wrote under `/sandbox/out/files/` into a
//! gzipped tar, uploads it to the executions bucket, and returns a
//! time-bounded presigned URL plus the ordered file list. Collection
//! failures never fail an execution; the runner logs and proceeds.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use skillbox_types::error::RunError;
use uuid::Uuid;

use crate::archive::safe_join;
use crate::storage::ObjectStore;

/// TTL for presigned artifact URLs.
const PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Packages and uploads execution artifacts over an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ArtifactCollector<S> {
    store: S,
}

impl<S: ObjectStore> ArtifactCollector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Collect every regular file under `files_dir` into a tar.gz at
    /// `{tenant}/{execution_id}/files.tar.gz`.
    ///
    /// An absent directory or one with no regular files yields empty
    /// values and no error. The returned list is sorted; archive entries
    /// use forward-slash paths relative to `files_dir`.
    pub async fn collect(
        &self,
        tenant_id: &str,
        execution_id: Uuid,
        files_dir: &Path,
    ) -> Result<(String, Vec<String>), RunError> {
        let files = list_regular_files(files_dir)?;
        if files.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let archive = build_tar_gz(files_dir, &files)?;

        let key = format!("{tenant_id}/{execution_id}/files.tar.gz");
        self.store.put(&key, archive, "application/gzip").await?;
        let url = self.store.presign_get(&key, PRESIGN_TTL).await?;

        Ok((url, files))
    }
}

/// Relative forward-slash paths of all regular files under `dir`, sorted.
/// Directories, symlinks, and other non-regular entries are skipped.
fn list_regular_files(dir: &Path) -> io::Result<Vec<String>> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(io::Error::other(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, base: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // DirEntry::file_type does not follow symlinks.
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk(&path, base, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(base)
                .map_err(|e| io::Error::other(e.to_string()))?;
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(name);
        }
    }
    Ok(())
}

/// Build a tar.gz archive from the listed files rooted at `base_dir`.
fn build_tar_gz(base_dir: &Path, files: &[String]) -> Result<Vec<u8>, RunError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for rel in files {
        // The walk only yields paths under base_dir, but the archive must
        // never trust its inputs.
        let abs = safe_join(base_dir, rel).map_err(io::Error::other)?;
        builder.append_path_with_name(&abs, rel)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryObjectStore;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn collector() -> ArtifactCollector<MemoryObjectStore> {
        ArtifactCollector::new(MemoryObjectStore::default())
    }

    #[tokio::test]
    async fn missing_dir_yields_empty_result() {
        let collector = collector();
        let (url, files) = collector
            .collect("acme", Uuid::new_v4(), Path::new("/nonexistent/files"))
            .await
            .unwrap();
        assert_eq!(url, "");
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn empty_dir_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector();
        let (url, files) = collector
            .collect("acme", Uuid::new_v4(), dir.path())
            .await
            .unwrap();
        assert_eq!(url, "");
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn collects_sorted_files_and_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.bin"), [0u8, 1, 2, 3]).unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.txt"), b"deep").unwrap();

        let store = MemoryObjectStore::default();
        let collector = ArtifactCollector::new(store.clone());
        let execution_id = Uuid::new_v4();

        let (url, files) = collector
            .collect("acme", execution_id, dir.path())
            .await
            .unwrap();

        assert_eq!(files, vec!["a.txt", "b.bin", "nested/c.txt"]);
        assert!(url.contains(&format!("acme/{execution_id}/files.tar.gz")));

        // The stored body is a gzip of a tar holding the same bytes.
        let key = format!("acme/{execution_id}/files.tar.gz");
        let stored = store.get(&key).await.unwrap();

        let mut decompressed = Vec::new();
        GzDecoder::new(&stored[..])
            .read_to_end(&mut decompressed)
            .unwrap();

        let mut archive = tar::Archive::new(&decompressed[..]);
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            seen.push((name, content));
        }

        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("a.txt".to_string(), b"hello".to_vec()),
                ("b.bin".to_string(), vec![0, 1, 2, 3]),
                ("nested/c.txt".to_string(), b"deep".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"data").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("/etc/passwd", dir.path().join("link")).unwrap();

        let collector = collector();
        let (_, files) = collector
            .collect("acme", Uuid::new_v4(), dir.path())
            .await
            .unwrap();

        assert_eq!(files, vec!["real.txt"]);
    }
}
