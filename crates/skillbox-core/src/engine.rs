//! Container-engine port.
//!
//! The runner drives containers exclusively through this trait so the
//! orchestration logic stays independent of the Docker client. The bollard
//! implementation lives in skillbox-infra; tests use a scripted fake.

use std::collections::HashMap;

use skillbox_types::error::EngineError;

/// Label attached to every container the runner creates; the orphan reaper
/// sweeps on it at startup.
pub const MANAGED_BY_KEY: &str = "managed-by";
pub const MANAGED_BY_VALUE: &str = "skillbox";

/// Full creation-time configuration for a sandbox container.
///
/// The runner fills every field; the engine implementation maps them onto
/// the engine's own request types without reinterpreting them.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    /// Numeric `uid:gid`.
    pub user: String,
    pub working_dir: String,
    pub labels: HashMap<String, String>,
    pub network_mode: String,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
    pub memory_bytes: i64,
    /// Equal to `memory_bytes` so the container gets no swap.
    pub memory_swap_bytes: i64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub pids_limit: i64,
    /// Mount path to tmpfs options, e.g. `/tmp` -> `rw,exec,nosuid,size=256m`.
    pub tmpfs: HashMap<String, String>,
    /// Always false: the runner owns removal.
    pub auto_remove: bool,
}

/// A container as reported by a label-filtered listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub image: String,
    pub status: String,
}

/// Blocking container lifecycle operations.
///
/// All methods are one engine API call; the runner wraps each in its own
/// deadline. Implementations must be safe for concurrent use.
pub trait ContainerEngine: Send + Sync {
    /// Create a container and return its id.
    fn create(
        &self,
        spec: &ContainerSpec,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;

    /// Extract a tar stream into the container at `dest`.
    fn copy_in(
        &self,
        id: &str,
        dest: &str,
        archive: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    fn start(&self, id: &str)
    -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Block until the container is no longer running; returns the exit code.
    fn wait(&self, id: &str)
    -> impl std::future::Future<Output = Result<i64, EngineError>> + Send;

    /// Combined stdout+stderr, possibly still carrying the engine's 8-byte
    /// multiplexing frames, capped at `max_bytes`.
    fn logs(
        &self,
        id: &str,
        max_bytes: i64,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, EngineError>> + Send;

    /// Read a path out of the container as a tar stream.
    fn copy_out(
        &self,
        id: &str,
        src: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, EngineError>> + Send;

    fn kill(
        &self,
        id: &str,
        signal: &str,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Force-remove the container together with its volumes.
    fn remove(&self, id: &str)
    -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// List containers (any state) carrying the given label.
    fn list_labeled(
        &self,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ContainerSummary>, EngineError>> + Send;
}
