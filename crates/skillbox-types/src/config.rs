//! Runtime configuration types.
//!
//! [`Config`] is the full server configuration assembled by the environment
//! loader in skillbox-infra. [`RunnerSettings`] is the subset the execution
//! core consumes: defaults and hard maxima for timeout, memory, CPU, output
//! size, plus the image allowlist and the admission bound.

use std::time::Duration;

/// Defaults and limits the runner enforces per execution.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Exact container image references the server will run.
    pub image_allowlist: Vec<String>,
    /// Timeout applied when the manifest does not set one.
    pub default_timeout: Duration,
    /// Hard cap on manifest-requested timeouts.
    pub max_timeout: Duration,
    /// Memory limit in bytes when the manifest does not set one.
    pub default_memory_bytes: i64,
    /// Fractional cores when the manifest does not set a CPU limit.
    pub default_cpu: f64,
    /// Byte cap on collected container logs.
    pub max_output_size: i64,
    /// Admission semaphore capacity.
    pub max_concurrent_execs: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            image_allowlist: default_image_allowlist(),
            default_timeout: Duration::from_secs(120),
            max_timeout: Duration::from_secs(600),
            default_memory_bytes: 256 * 1024 * 1024,
            default_cpu: 0.5,
            max_output_size: 1024 * 1024,
            max_concurrent_execs: 10,
        }
    }
}

/// Full server configuration, loaded from `SKILLBOX_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string (required).
    pub db_dsn: String,

    /// S3 / MinIO endpoint, e.g. `localhost:9000` (required).
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_bucket_skills: String,
    pub s3_bucket_executions: String,
    pub s3_use_ssl: bool,

    /// Container engine endpoint; empty means platform defaults.
    pub docker_host: String,

    pub image_allowlist: Vec<String>,
    pub default_timeout: Duration,
    pub max_timeout: Duration,
    pub default_memory_bytes: i64,
    pub default_cpu: f64,
    pub max_output_size: i64,
    /// Upload byte cap for skill archives.
    pub max_skill_size: i64,
    pub max_concurrent_execs: usize,
}

impl Config {
    /// The subset of configuration the runner consumes.
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            image_allowlist: self.image_allowlist.clone(),
            default_timeout: self.default_timeout,
            max_timeout: self.max_timeout,
            default_memory_bytes: self.default_memory_bytes,
            default_cpu: self.default_cpu,
            max_output_size: self.max_output_size,
            max_concurrent_execs: self.max_concurrent_execs,
        }
    }
}

pub fn default_image_allowlist() -> Vec<String> {
    [
        "python:3.12-slim",
        "python:3.11-slim",
        "node:20-slim",
        "node:18-slim",
        "alpine:3",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
