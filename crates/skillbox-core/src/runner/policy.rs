//! Image allowlist and resource-limit parsing.

use skillbox_types::error::RunError;

/// CPU quota period in microseconds (100ms).
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// Minimum CPU quota the engine accepts, in microseconds.
const MIN_CPU_QUOTA_MICROS: i64 = 1_000;

/// Check that the requested container image is present in the allowlist.
///
/// An empty allowlist permits nothing. The comparison is case-sensitive
/// and requires an exact match -- no prefix semantics, no tag globbing.
pub fn validate_image(image: &str, allowlist: &[String]) -> Result<(), RunError> {
    if image.is_empty() {
        return Err(RunError::ImageNotAllowed(
            "image name is required".to_string(),
        ));
    }
    if allowlist.is_empty() {
        return Err(RunError::ImageNotAllowed(
            "image allowlist is empty; no images are permitted".to_string(),
        ));
    }
    if allowlist.iter().any(|allowed| allowed == image) {
        return Ok(());
    }

    Err(RunError::ImageNotAllowed(format!(
        "image {image:?} is not in the allowlist (allowed: {})",
        allowlist.join(", ")
    )))
}

/// Convert a Kubernetes-style memory string to bytes.
///
/// Supported suffixes: `Ki` (1024), `Mi` (1024^2), `Gi` (1024^3). A plain
/// integer is treated as bytes. Zero and negative values are rejected.
pub fn parse_memory_limit(limit: &str) -> Result<i64, RunError> {
    let limit = limit.trim();
    if limit.is_empty() {
        return Err(RunError::ResourceInvalid("empty memory limit".to_string()));
    }

    // Longer suffixes first to avoid partial matches.
    const SUFFIXES: [(&str, i64); 3] = [("Gi", 1 << 30), ("Mi", 1 << 20), ("Ki", 1 << 10)];

    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = limit.strip_suffix(suffix) {
            let n: i64 = number.parse().map_err(|e| {
                RunError::ResourceInvalid(format!(
                    "invalid numeric part {number:?} in memory limit {limit:?}: {e}"
                ))
            })?;
            if n <= 0 {
                return Err(RunError::ResourceInvalid(format!(
                    "memory limit must be positive, got {limit:?}"
                )));
            }
            return n.checked_mul(multiplier).ok_or_else(|| {
                RunError::ResourceInvalid(format!("memory limit {limit:?} overflows"))
            });
        }
    }

    let n: i64 = limit.parse().map_err(|e| {
        RunError::ResourceInvalid(format!("invalid memory limit {limit:?}: {e}"))
    })?;
    if n <= 0 {
        return Err(RunError::ResourceInvalid(format!(
            "memory limit must be positive, got {limit:?}"
        )));
    }
    Ok(n)
}

/// Convert a fractional CPU string ("0.5", "1", "2") into a CPU quota in
/// microseconds per 100ms period:
///
///   0.5 CPU -> 50_000
///   1 CPU   -> 100_000
///   2 CPUs  -> 200_000
///
/// Quotas below the engine's 1000 microsecond minimum are clamped up.
pub fn parse_cpu_limit(limit: &str) -> Result<i64, RunError> {
    let limit = limit.trim();
    if limit.is_empty() {
        return Err(RunError::ResourceInvalid("empty CPU limit".to_string()));
    }

    let cpu: f64 = limit
        .parse()
        .map_err(|e| RunError::ResourceInvalid(format!("invalid CPU limit {limit:?}: {e}")))?;
    if !cpu.is_finite() || cpu <= 0.0 {
        return Err(RunError::ResourceInvalid(format!(
            "CPU limit must be positive, got {limit:?}"
        )));
    }

    let quota = (cpu * CPU_PERIOD_MICROS as f64).round() as i64;
    Ok(quota.max(MIN_CPU_QUOTA_MICROS))
}
