//! Sandbox assembly: the injected filesystem tree, the container command,
//! the environment policy, and log de-framing.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use skillbox_types::error::RunError;
use skillbox_types::skill::Language;

/// Environment variable names callers may not override. These are either
/// security-sensitive (LD_PRELOAD) or reserved by the sandbox runtime
/// (`SANDBOX_*`, `SKILL_*` via the prefix check).
const BLOCKED_ENV_KEYS: [&str; 7] = [
    "PATH",
    "HOME",
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "PYTHONPATH",
    "NODE_PATH",
    "NODE_OPTIONS",
];

/// True when callers must not set the given key.
pub(crate) fn is_blocked_env_key(key: &str) -> bool {
    if BLOCKED_ENV_KEYS.contains(&key) {
        return true;
    }
    let upper = key.to_uppercase();
    upper.starts_with("SANDBOX_") || upper.starts_with("SKILL_")
}

/// Assemble the container environment: the fixed sandbox contract keys
/// first, then caller-supplied entries in sorted order. Fails on the
/// first blocked key before any container exists.
pub(crate) fn build_env(
    input_json: &str,
    instructions: &str,
    extra: &HashMap<String, String>,
) -> Result<Vec<String>, RunError> {
    let mut env = vec![
        format!("SANDBOX_INPUT={input_json}"),
        "SANDBOX_OUTPUT=/sandbox/out/output.json".to_string(),
        "SANDBOX_FILES_DIR=/sandbox/out/files/".to_string(),
        format!("SKILL_INSTRUCTIONS={instructions}"),
        "HOME=/tmp".to_string(),
    ];

    let mut keys: Vec<&String> = extra.keys().collect();
    keys.sort();
    for key in keys {
        if is_blocked_env_key(key) {
            return Err(RunError::EnvForbidden(key.clone()));
        }
        env.push(format!("{key}={}", extra[key]));
    }

    Ok(env)
}

/// The command to run inside the container, resolved from the skill's
/// language and dependency files. The entrypoint always lives under
/// `/sandbox/scripts/`.
pub(crate) fn build_command(
    language: Language,
    entrypoint: &str,
    has_requirements: bool,
) -> Vec<String> {
    let entrypoint = format!("/sandbox/scripts/{entrypoint}");

    match language {
        Language::Python => {
            if has_requirements {
                // Install dependencies into tmpfs, then run with PYTHONPATH
                // pointing at them so imports resolve.
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "pip install --no-cache-dir -r /sandbox/scripts/requirements.txt -t /tmp/deps && PYTHONPATH=/tmp/deps python {entrypoint}"
                    ),
                ]
            } else {
                vec!["python".to_string(), entrypoint]
            }
        }
        Language::Node => vec!["node".to_string(), entrypoint],
        Language::Bash => vec!["bash".to_string(), entrypoint],
    }
}

/// Build the tar archive that is extracted at `/` inside the container:
///
/// ```text
/// sandbox/                     0777
/// sandbox/scripts/...          skill files, scripts 0755
/// sandbox/input.json           0644
/// sandbox/out/                 0777
/// sandbox/out/files/           0777
/// ```
///
/// The output directories are world-writable because the container runs
/// as an unprivileged numeric uid.
pub(crate) fn build_sandbox_tar(skill_dir: &Path, input_json: &[u8]) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for dir in [
        "sandbox/",
        "sandbox/scripts/",
        "sandbox/out/",
        "sandbox/out/files/",
    ] {
        append_dir(&mut builder, dir, 0o777)?;
    }

    append_tree(&mut builder, skill_dir, "sandbox/scripts")?;

    append_file(&mut builder, "sandbox/input.json", input_json, 0o644)?;

    builder.into_inner()
}

fn append_dir(builder: &mut tar::Builder<Vec<u8>>, name: &str, mode: u32) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(mode);
    header.set_cksum();
    builder.append_data(&mut header, name, io::empty())
}

fn append_file(
    builder: &mut tar::Builder<Vec<u8>>,
    name: &str,
    data: &[u8],
    mode: u32,
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder.append_data(&mut header, name, data)
}

/// Append every file and directory under `root` beneath `prefix`, in
/// sorted order for a deterministic archive.
fn append_tree(builder: &mut tar::Builder<Vec<u8>>, root: &Path, prefix: &str) -> io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(root)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let tar_name = format!("{prefix}/{}", name.to_string_lossy());

        if file_type.is_dir() {
            append_dir(builder, &format!("{tar_name}/"), 0o755)?;
            append_tree(builder, &entry.path(), &tar_name)?;
        } else if file_type.is_file() {
            let data = std::fs::read(entry.path())?;
            // Scripts must be executable by the unprivileged container user.
            append_file(builder, &tar_name, &data, 0o755)?;
        }
    }

    Ok(())
}

/// Strip the engine's 8-byte stream-multiplexing headers from raw log
/// bytes. Each frame is `stream_type(1) | 0 0 0 | size(4, big-endian)`
/// followed by the payload. A byte sequence is treated as a header iff
/// the first byte is 0, 1, or 2 and the next three are zero; anything
/// else passes through untouched.
pub(crate) fn strip_log_frames(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }

    let mut cleaned = Vec::with_capacity(data.len());
    let mut pos = 0;

    while pos < data.len() {
        if pos + 8 > data.len() {
            cleaned.extend_from_slice(&data[pos..]);
            break;
        }

        let stream_type = data[pos];
        if stream_type <= 2 && data[pos + 1] == 0 && data[pos + 2] == 0 && data[pos + 3] == 0 {
            let size = u32::from_be_bytes([
                data[pos + 4],
                data[pos + 5],
                data[pos + 6],
                data[pos + 7],
            ]) as usize;
            pos += 8;

            let end = (pos + size).min(data.len());
            cleaned.extend_from_slice(&data[pos..end]);
            pos = end;
        } else {
            cleaned.push(data[pos]);
            pos += 1;
        }
    }

    String::from_utf8_lossy(&cleaned).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn blocked_env_exact_keys() {
        for key in BLOCKED_ENV_KEYS {
            assert!(is_blocked_env_key(key), "{key} should be blocked");
        }
        assert!(!is_blocked_env_key("MY_API_KEY"));
        assert!(!is_blocked_env_key("path"));
    }

    #[test]
    fn blocked_env_reserved_prefixes() {
        assert!(is_blocked_env_key("SANDBOX_INPUT"));
        assert!(is_blocked_env_key("sandbox_anything"));
        assert!(is_blocked_env_key("SKILL_INSTRUCTIONS"));
        assert!(is_blocked_env_key("skill_x"));
        assert!(!is_blocked_env_key("SKILLET"));
        assert!(!is_blocked_env_key("SANDBOXED"));
    }

    #[test]
    fn build_env_sets_contract_keys() {
        let env = build_env("{\"x\":1}", "Do the thing.", &HashMap::new()).unwrap();

        assert!(env.contains(&"SANDBOX_INPUT={\"x\":1}".to_string()));
        assert!(env.contains(&"SANDBOX_OUTPUT=/sandbox/out/output.json".to_string()));
        assert!(env.contains(&"SANDBOX_FILES_DIR=/sandbox/out/files/".to_string()));
        assert!(env.contains(&"SKILL_INSTRUCTIONS=Do the thing.".to_string()));
        assert!(env.contains(&"HOME=/tmp".to_string()));
    }

    #[test]
    fn build_env_rejects_blocked_keys() {
        let extra = HashMap::from([("LD_PRELOAD".to_string(), "/tmp/x.so".to_string())]);
        let err = build_env("{}", "", &extra).unwrap_err();
        assert!(err.to_string().contains("LD_PRELOAD"));
    }

    #[test]
    fn build_env_appends_user_entries_sorted() {
        let extra = HashMap::from([
            ("ZED".to_string(), "26".to_string()),
            ("ALPHA".to_string(), "1".to_string()),
        ]);
        let env = build_env("{}", "", &extra).unwrap();
        let tail = &env[env.len() - 2..];
        assert_eq!(tail, ["ALPHA=1".to_string(), "ZED=26".to_string()]);
    }

    #[test]
    fn command_python_plain() {
        let cmd = build_command(Language::Python, "main.py", false);
        assert_eq!(cmd, ["python", "/sandbox/scripts/main.py"]);
    }

    #[test]
    fn command_python_with_requirements() {
        let cmd = build_command(Language::Python, "main.py", true);
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert!(cmd[2].contains("pip install --no-cache-dir -r /sandbox/scripts/requirements.txt"));
        assert!(cmd[2].contains("PYTHONPATH=/tmp/deps python /sandbox/scripts/main.py"));
    }

    #[test]
    fn command_node_and_bash() {
        assert_eq!(
            build_command(Language::Node, "main.js", false),
            ["node", "/sandbox/scripts/main.js"]
        );
        assert_eq!(
            build_command(Language::Bash, "scripts/main.sh", false),
            ["bash", "/sandbox/scripts/scripts/main.sh"]
        );
    }

    #[test]
    fn sandbox_tar_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), b"print('hi')").unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/util.py"), b"pass").unwrap();

        let data = build_sandbox_tar(dir.path(), b"{\"x\":1}").unwrap();

        let mut archive = tar::Archive::new(&data[..]);
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mode = entry.header().mode().unwrap();
            let mut content = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
            seen.push((name, mode, content));
        }

        let dir_mode = |name: &str| {
            seen.iter()
                .find(|(n, _, _)| n.trim_end_matches('/') == name.trim_end_matches('/'))
                .map(|(_, mode, _)| *mode)
        };
        assert_eq!(dir_mode("sandbox"), Some(0o777));
        assert_eq!(dir_mode("sandbox/out"), Some(0o777));
        assert_eq!(dir_mode("sandbox/out/files"), Some(0o777));

        let script = seen
            .iter()
            .find(|(name, _, _)| name == "sandbox/scripts/main.py")
            .unwrap();
        assert_eq!(script.1, 0o755);
        assert_eq!(script.2, b"print('hi')");

        let nested = seen
            .iter()
            .find(|(name, _, _)| name == "sandbox/scripts/lib/util.py")
            .unwrap();
        assert_eq!(nested.2, b"pass");

        let input = seen
            .iter()
            .find(|(name, _, _)| name == "sandbox/input.json")
            .unwrap();
        assert_eq!(input.1, 0o644);
        assert_eq!(input.2, b"{\"x\":1}");
    }

    #[test]
    fn strip_frames_removes_headers() {
        let mut data = frame(1, b"hello ");
        data.extend(frame(2, b"world"));
        assert_eq!(strip_log_frames(&data), "hello world");
    }

    #[test]
    fn strip_frames_passes_plain_text_through() {
        let data = b"plain log line\nanother line\n";
        assert_eq!(strip_log_frames(data), String::from_utf8_lossy(data));
    }

    #[test]
    fn strip_frames_handles_truncated_trailer() {
        let mut data = frame(1, b"ok");
        data.extend_from_slice(&[1, 0, 0]); // partial header at the end
        let cleaned = strip_log_frames(&data);
        assert!(cleaned.starts_with("ok"));
    }

    #[test]
    fn strip_frames_caps_oversized_frame_size() {
        // Header claims more payload than is present.
        let mut data = vec![1, 0, 0, 0];
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"short");
        assert_eq!(strip_log_frames(&data), "short");
    }

    #[test]
    fn strip_frames_empty_input() {
        assert_eq!(strip_log_frames(&[]), "");
    }
}
