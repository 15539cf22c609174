//! Safe archive extraction.
//!
//! Both extraction directions -- skill zips into the private temp dir and
//! tar streams copied out of containers -- apply the same two-pronged
//! guard: reject any entry name containing `..`, then verify the joined
//! destination still resolves strictly under the extraction root. Neither
//! check alone is sufficient.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use skillbox_types::error::RunError;

/// Per-file read cap when extracting tar streams copied out of containers.
pub(crate) const TAR_FILE_CAP: u64 = 512 << 20;

/// Join `name` onto `root`, rejecting traversal.
pub(crate) fn safe_join(root: &Path, name: &str) -> Result<PathBuf, String> {
    if name.contains("..") {
        return Err(format!("illegal path {name:?}: contains '..'"));
    }

    let mut dest = root.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => dest.push(part),
            Component::CurDir => {}
            _ => {
                return Err(format!(
                    "illegal path {name:?}: absolute or traversal component"
                ));
            }
        }
    }

    if !dest.starts_with(root) {
        return Err(format!(
            "illegal path {name:?}: resolves outside the extraction root"
        ));
    }

    Ok(dest)
}

/// Extract a zip archive into `root`.
///
/// Directory entries are created with mode 0755; regular files keep the
/// mode recorded in the archive (0644 when absent). Other entry types are
/// ignored.
pub(crate) fn extract_zip(data: &[u8], root: &Path) -> Result<(), RunError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| RunError::InvalidSkill(format!("opening skill archive: {e}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| RunError::InvalidSkill(format!("reading skill archive: {e}")))?;
        let name = entry.name().to_string();

        let dest = safe_join(root, &name).map_err(RunError::InvalidSkill)?;

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            set_mode(&dest, 0o755)?;
            continue;
        }

        // Symlinks and other special entries are ignored.
        if entry
            .unix_mode()
            .is_some_and(|mode| mode & 0o170000 == 0o120000)
        {
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;

        let mode = entry
            .unix_mode()
            .map(|mode| mode & 0o777)
            .filter(|mode| *mode != 0)
            .unwrap_or(0o644);
        set_mode(&dest, mode)?;
    }

    Ok(())
}

/// Extract a tar stream into `root` with the traversal guard and a
/// per-file read cap. Entry types other than directories and regular
/// files are skipped.
pub(crate) fn extract_tar(data: &[u8], root: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(data);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();

        let dest = match safe_join(root, &name) {
            Ok(dest) => dest,
            // Hostile entry in container output: skip it, keep the rest.
            Err(reason) => {
                tracing::warn!(entry = %name, %reason, "skipping tar entry");
                continue;
            }
        };

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest)?;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = fs::File::create(&dest)?;
                io::copy(&mut (&mut entry).take(TAR_FILE_CAP), &mut out)?;
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn safe_join_accepts_nested_paths() {
        let root = Path::new("/tmp/extract");
        let joined = safe_join(root, "scripts/main.py").unwrap();
        assert_eq!(joined, root.join("scripts/main.py"));
    }

    #[test]
    fn safe_join_rejects_dotdot() {
        let root = Path::new("/tmp/extract");
        let err = safe_join(root, "../evil.txt").unwrap_err();
        assert!(err.contains(".."));
    }

    #[test]
    fn safe_join_rejects_embedded_dotdot() {
        let root = Path::new("/tmp/extract");
        assert!(safe_join(root, "a/../../evil.txt").is_err());
        // Even a name merely containing ".." is rejected.
        assert!(safe_join(root, "a..b/file.txt").is_err());
    }

    #[test]
    fn safe_join_rejects_absolute() {
        let root = Path::new("/tmp/extract");
        assert!(safe_join(root, "/etc/passwd").is_err());
    }

    #[test]
    fn extract_zip_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = zip_with_entries(&[
            ("SKILL.md", b"---\nname: x\n---\nbody"),
            ("scripts/main.py", b"print('hi')"),
        ]);

        extract_zip(&data, dir.path()).unwrap();

        assert!(dir.path().join("SKILL.md").is_file());
        let script = std::fs::read(dir.path().join("scripts/main.py")).unwrap();
        assert_eq!(script, b"print('hi')");
    }

    #[test]
    fn extract_zip_rejects_traversal_entries() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("extract");
        fs::create_dir(&root).unwrap();
        let data = zip_with_entries(&[("../outside.txt", b"escaped")]);

        let err = extract_zip(&data, &root).unwrap_err();
        assert!(err.to_string().contains("illegal path"));

        // Nothing may land outside the extraction root.
        assert!(!outer.path().join("outside.txt").exists());
    }

    #[test]
    fn extract_zip_adversarial_names_never_escape() {
        let hostile = [
            "../../../../etc/cron.d/evil",
            "..\\windows\\escape",
            "a/../../b.txt",
            "/absolute.txt",
        ];
        for name in hostile {
            let outer = tempfile::tempdir().unwrap();
            let root = outer.path().join("extract");
            fs::create_dir(&root).unwrap();

            let data = zip_with_entries(&[(name, b"payload")]);
            let _ = extract_zip(&data, &root);

            // Whatever the per-entry verdict, nothing may land outside
            // the extraction root.
            let outside: Vec<_> = fs::read_dir(outer.path())
                .unwrap()
                .map(|entry| entry.unwrap().path())
                .filter(|path| *path != root)
                .collect();
            assert!(outside.is_empty(), "entry {name:?} escaped to {outside:?}");
        }
    }

    #[test]
    fn extract_tar_skips_hostile_entries() {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "out/ok.txt", &b"good"[..])
            .unwrap();

        let mut evil = tar::Header::new_gnu();
        evil.set_size(4);
        evil.set_mode(0o644);
        // `Header::set_path`/`Builder::append_data` reject `..` components,
        // so the hostile name is written directly into the raw header bytes
        // to exercise `extract_tar`'s own traversal guard.
        let path_bytes = b"out/../../evil.txt";
        evil.as_old_mut().name[..path_bytes.len()].copy_from_slice(path_bytes);
        evil.set_cksum();
        builder.append(&evil, &b"bad!"[..]).unwrap();

        let data = builder.into_inner().unwrap();
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("extract");
        fs::create_dir(&root).unwrap();
        extract_tar(&data, &root).unwrap();

        assert!(root.join("out/ok.txt").is_file());
        assert!(!outer.path().join("evil.txt").exists());
    }
}
