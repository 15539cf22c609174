//! Environment configuration loader.
//!
//! Reads `SKILLBOX_*` variables into a [`Config`], validating required
//! fields and parsing durations and resource quantities. Configuration is
//! strictly separated from code; nothing here reads files.

use std::collections::HashMap;
use std::time::Duration;

use skillbox_types::config::{Config, default_image_allowlist};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {0}")]
    MissingVars(String),

    #[error("{key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Load configuration from the process environment.
pub fn load() -> Result<Config, ConfigError> {
    from_vars(&std::env::vars().collect())
}

/// Build a [`Config`] from the given variable map. Split out from
/// [`load`] so tests never touch global process state.
pub fn from_vars(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
    let get = |key: &str| vars.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
    let get_or = |key: &str, fallback: &str| {
        let value = get(key);
        if value.is_empty() { fallback.to_string() } else { value }
    };

    let mut missing = Vec::new();
    let mut require = |key: &str| {
        let value = get(key);
        if value.is_empty() {
            missing.push(key.to_string());
        }
        value
    };

    let db_dsn = require("SKILLBOX_DB_DSN");
    let s3_endpoint = require("SKILLBOX_S3_ENDPOINT");
    let s3_access_key = require("SKILLBOX_S3_ACCESS_KEY");
    let s3_secret_key = require("SKILLBOX_S3_SECRET_KEY");

    if !missing.is_empty() {
        return Err(ConfigError::MissingVars(missing.join(", ")));
    }

    let invalid = |key: &str, reason: String| ConfigError::Invalid {
        key: key.to_string(),
        reason,
    };

    let s3_use_ssl = parse_bool(&get_or("SKILLBOX_S3_USE_SSL", "false"))
        .map_err(|reason| invalid("SKILLBOX_S3_USE_SSL", reason))?;

    let image_allowlist = match get("SKILLBOX_IMAGE_ALLOWLIST") {
        raw if raw.is_empty() => default_image_allowlist(),
        raw => raw
            .split(',')
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .map(str::to_string)
            .collect(),
    };

    let default_timeout = parse_duration_var(&get_or("SKILLBOX_DEFAULT_TIMEOUT", "120s"))
        .map_err(|reason| invalid("SKILLBOX_DEFAULT_TIMEOUT", reason))?;
    let max_timeout = parse_duration_var(&get_or("SKILLBOX_MAX_TIMEOUT", "10m"))
        .map_err(|reason| invalid("SKILLBOX_MAX_TIMEOUT", reason))?;
    if default_timeout > max_timeout {
        return Err(invalid(
            "SKILLBOX_DEFAULT_TIMEOUT",
            format!(
                "default timeout {} exceeds max timeout {}",
                humantime::format_duration(default_timeout),
                humantime::format_duration(max_timeout)
            ),
        ));
    }

    let default_memory_bytes = parse_memory(&get_or("SKILLBOX_DEFAULT_MEMORY", "256Mi"))
        .map_err(|reason| invalid("SKILLBOX_DEFAULT_MEMORY", reason))?;

    let default_cpu: f64 = get_or("SKILLBOX_DEFAULT_CPU", "0.5")
        .parse()
        .map_err(|e| invalid("SKILLBOX_DEFAULT_CPU", format!("{e}")))?;
    if !default_cpu.is_finite() || default_cpu <= 0.0 {
        return Err(invalid(
            "SKILLBOX_DEFAULT_CPU",
            format!("must be positive, got {default_cpu}"),
        ));
    }

    let max_output_size: i64 = get_or("SKILLBOX_MAX_OUTPUT_SIZE", "1048576")
        .parse()
        .map_err(|e| invalid("SKILLBOX_MAX_OUTPUT_SIZE", format!("{e}")))?;

    let max_skill_size: i64 = get_or("SKILLBOX_MAX_SKILL_SIZE", "52428800")
        .parse()
        .map_err(|e| invalid("SKILLBOX_MAX_SKILL_SIZE", format!("{e}")))?;

    let max_concurrent_execs: i64 = get_or("SKILLBOX_MAX_CONCURRENT_EXECS", "10")
        .parse()
        .map_err(|e| invalid("SKILLBOX_MAX_CONCURRENT_EXECS", format!("{e}")))?;
    if max_concurrent_execs <= 0 {
        return Err(invalid(
            "SKILLBOX_MAX_CONCURRENT_EXECS",
            format!("must be positive, got {max_concurrent_execs}"),
        ));
    }

    Ok(Config {
        db_dsn,
        s3_endpoint,
        s3_access_key,
        s3_secret_key,
        s3_bucket_skills: get_or("SKILLBOX_S3_BUCKET_SKILLS", "skills"),
        s3_bucket_executions: get_or("SKILLBOX_S3_BUCKET_EXECUTIONS", "executions"),
        s3_use_ssl,
        docker_host: get("SKILLBOX_DOCKER_HOST"),
        image_allowlist,
        default_timeout,
        max_timeout,
        default_memory_bytes,
        default_cpu,
        max_output_size,
        max_skill_size,
        max_concurrent_execs: max_concurrent_execs as usize,
    })
}

fn parse_duration_var(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("invalid boolean value: {other:?}")),
    }
}

/// Convert a human-readable memory string to bytes.
///
/// Suffixes are case-insensitive: `Ki`/`K` (1024), `Mi`/`M` (1024^2),
/// `Gi`/`G` (1024^3). A plain integer is treated as bytes. This loader
/// accepts more spellings than the strict manifest parser in
/// `skillbox-core`; operator convenience wins at the config boundary.
pub fn parse_memory(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty memory string".to_string());
    }

    const SUFFIXES: [(&str, i64); 6] = [
        ("gi", 1 << 30),
        ("g", 1 << 30),
        ("mi", 1 << 20),
        ("m", 1 << 20),
        ("ki", 1 << 10),
        ("k", 1 << 10),
    ];

    let lower = raw.to_lowercase();
    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = lower.strip_suffix(suffix) {
            let n: i64 = number
                .parse()
                .map_err(|e| format!("invalid numeric part {number:?} in memory string {raw:?}: {e}"))?;
            if n < 0 {
                return Err(format!("negative memory value: {raw}"));
            }
            return n
                .checked_mul(multiplier)
                .ok_or_else(|| format!("memory value {raw:?} overflows"));
        }
    }

    let n: i64 = lower
        .parse()
        .map_err(|e| format!("invalid memory string {raw:?}: {e}"))?;
    if n < 0 {
        return Err(format!("negative memory value: {raw}"));
    }
    Ok(n)
}
