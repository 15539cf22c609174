//! The execution orchestrator.
//!
//! [`Runner::run`] drives the whole pipeline: admission, version
//! resolution, record creation, skill materialization, image policy,
//! resource shaping, sandbox injection, container lifecycle, output
//! extraction, artifact collection, classification, and cleanup. Every
//! exit path after record creation writes the terminal record exactly
//! once (the completion update is conditional on the row still running).

pub mod cleanup;
pub mod policy;
mod sandbox;

use std::collections::HashMap;
use std::time::Duration;

use skillbox_types::config::RunnerSettings;
use skillbox_types::error::{EngineError, RunError};
use skillbox_types::execution::{Execution, ExecutionStatus, RunRequest, RunResult};
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::archive::extract_tar;
use crate::artifacts::ArtifactCollector;
use crate::engine::{ContainerEngine, ContainerSpec, MANAGED_BY_KEY, MANAGED_BY_VALUE};
use crate::registry::SkillRegistry;
use crate::repository::ExecutionRepository;
use crate::runner::policy::{CPU_PERIOD_MICROS, parse_cpu_limit, parse_memory_limit, validate_image};
use crate::runner::sandbox::{build_command, build_env, build_sandbox_tar, strip_log_frames};
use crate::skill::load_skill;
use crate::storage::ObjectStore;

pub use cleanup::reap_orphans;

/// Bound for every cleanup operation on an error path (kill, remove,
/// log tail). Never derived from the execution deadline, so cleanup
/// proceeds even after cancellation.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

const KILL_SIGNAL: &str = "SIGKILL";

/// Sandbox-internal paths, fixed by the container contract.
const SANDBOX_WORKDIR: &str = "/sandbox";
const SANDBOX_OUT: &str = "/sandbox/out";

/// Orchestrates sandboxed skill executions.
///
/// Shared across callers behind an `Arc`; the admission semaphore is the
/// only cross-execution synchronizer.
pub struct Runner<E, S, A, R> {
    engine: E,
    registry: SkillRegistry<S>,
    artifacts: ArtifactCollector<A>,
    executions: R,
    settings: RunnerSettings,
    semaphore: Semaphore,
}

impl<E, S, A, R> Runner<E, S, A, R>
where
    E: ContainerEngine,
    S: ObjectStore,
    A: ObjectStore,
    R: ExecutionRepository,
{
    pub fn new(
        engine: E,
        registry: SkillRegistry<S>,
        artifacts: ArtifactCollector<A>,
        executions: R,
        settings: RunnerSettings,
    ) -> Self {
        let permits = settings.max_concurrent_execs.max(1);
        Self {
            engine,
            registry,
            artifacts,
            executions,
            settings,
            semaphore: Semaphore::new(permits),
        }
    }

    /// Execute a skill in a sandboxed container and block until it exits,
    /// is killed, or times out.
    ///
    /// Admission, version resolution, and record creation fail directly
    /// to the caller with no record written. After the record exists,
    /// every failure becomes the terminal record's status and error, and
    /// the result is returned as a value.
    pub async fn run(&self, req: RunRequest) -> Result<RunResult, RunError> {
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            RunError::Engine(EngineError::Backend("admission semaphore closed".to_string()))
        })?;

        let started = std::time::Instant::now();

        let version = if req.version.is_empty() || req.version == "latest" {
            self.registry
                .resolve_latest(&req.tenant_id, &req.skill)
                .await?
        } else {
            req.version.clone()
        };

        let record = Execution::started(&req.skill, &version, &req.tenant_id, req.input.clone());
        self.executions.create(&record).await?;

        let mut result = RunResult::pending(record.id);
        self.execute(&req, &version, &mut result).await;
        result.duration_ms = started.elapsed().as_millis() as i64;

        self.finish_record(&record, &result).await;
        Ok(result)
    }

    /// Everything after record creation. Failures land in `result`
    /// instead of propagating.
    async fn execute(&self, req: &RunRequest, version: &str, result: &mut RunResult) {
        let loaded = match load_skill(&self.registry, &req.tenant_id, &req.skill, version).await {
            Ok(loaded) => loaded,
            Err(e) => {
                result.error = Some(format!("loading skill: {e}"));
                return;
            }
        };

        let image = loaded.spec.resolved_image();
        if let Err(e) = validate_image(&image, &self.settings.image_allowlist) {
            result.error = Some(format!("image validation: {e}"));
            return;
        }

        // Resource shaping: process defaults, overridden by the manifest.
        let mut memory_bytes = self.settings.default_memory_bytes;
        if let Some(memory) = loaded.spec.resources.memory.as_deref() {
            match parse_memory_limit(memory) {
                Ok(bytes) => memory_bytes = bytes,
                Err(e) => {
                    result.error = Some(format!("parsing memory limit: {e}"));
                    return;
                }
            }
        }

        let mut cpu_quota = (self.settings.default_cpu * CPU_PERIOD_MICROS as f64).round() as i64;
        if let Some(cpu) = loaded.spec.resources.cpu.as_deref() {
            match parse_cpu_limit(cpu) {
                Ok(quota) => cpu_quota = quota,
                Err(e) => {
                    result.error = Some(format!("parsing CPU limit: {e}"));
                    return;
                }
            }
        }

        let run_timeout = match loaded.spec.timeout {
            Some(t) if t > Duration::ZERO => t.min(self.settings.max_timeout),
            _ => self.settings.default_timeout,
        };
        let deadline = Instant::now() + run_timeout;

        let input_json = match &req.input {
            Some(value) => value.to_string(),
            None => "{}".to_string(),
        };

        let env = match build_env(&input_json, &loaded.spec.instructions, &req.env) {
            Ok(env) => env,
            Err(e) => {
                result.error = Some(e.to_string());
                return;
            }
        };

        let cmd = build_command(
            loaded.spec.language,
            &loaded.entrypoint,
            loaded.has_requirements,
        );

        let sandbox_tar = match build_sandbox_tar(loaded.dir(), input_json.as_bytes()) {
            Ok(archive) => archive,
            Err(e) => {
                result.error = Some(format!("creating sandbox tar: {e}"));
                return;
            }
        };

        // Full security hardening. Files are injected by copying a tar
        // into the container rather than bind-mounting: the server may
        // itself run inside a container, where host paths are meaningless.
        let spec = ContainerSpec {
            image,
            cmd,
            env,
            user: "65534:65534".to_string(),
            working_dir: SANDBOX_WORKDIR.to_string(),
            labels: HashMap::from([
                (MANAGED_BY_KEY.to_string(), MANAGED_BY_VALUE.to_string()),
                ("tenant".to_string(), req.tenant_id.clone()),
                ("skill".to_string(), req.skill.clone()),
                ("execution".to_string(), result.execution_id.to_string()),
            ]),
            network_mode: "bridge".to_string(),
            cap_drop: vec!["ALL".to_string()],
            security_opt: vec!["no-new-privileges:true".to_string()],
            memory_bytes,
            memory_swap_bytes: memory_bytes,
            cpu_quota,
            cpu_period: CPU_PERIOD_MICROS,
            pids_limit: 128,
            tmpfs: HashMap::from([("/tmp".to_string(), "rw,exec,nosuid,size=256m".to_string())]),
            auto_remove: false,
        };

        let container_id = match timeout_at(deadline, self.engine.create(&spec)).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                result.error = Some(format!("creating container: {e}"));
                return;
            }
            Err(_) => {
                result.error = Some("creating container: deadline exceeded".to_string());
                return;
            }
        };

        self.run_container(&container_id, sandbox_tar, deadline, run_timeout, req, result)
            .await;

        self.remove_container(&container_id).await;
        // `loaded` drops here, removing the private skill directory.
    }

    /// Copy-in, start, wait, collect. The container already exists;
    /// the caller removes it afterwards on every path.
    async fn run_container(
        &self,
        container_id: &str,
        sandbox_tar: Vec<u8>,
        deadline: Instant,
        run_timeout: Duration,
        req: &RunRequest,
        result: &mut RunResult,
    ) {
        match timeout_at(deadline, self.engine.copy_in(container_id, "/", sandbox_tar)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                result.error = Some(format!("copying sandbox to container: {e}"));
                return;
            }
            Err(_) => {
                result.error = Some("copying sandbox to container: deadline exceeded".to_string());
                return;
            }
        }

        match timeout_at(deadline, self.engine.start(container_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                result.error = Some(format!("starting container: {e}"));
                return;
            }
            Err(_) => {
                result.error = Some("starting container: deadline exceeded".to_string());
                return;
            }
        }

        let exit_code = match timeout_at(deadline, self.engine.wait(container_id)).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                result.error = Some(format!("waiting for container: {e}"));
                return;
            }
            Err(_) => {
                // Deadline fired: classify as timeout and kill under a
                // fresh bound so cleanup is unaffected by the deadline.
                match tokio::time::timeout(
                    CLEANUP_TIMEOUT,
                    self.engine.kill(container_id, KILL_SIGNAL),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(
                        container = %short_id(container_id),
                        error = %e,
                        "failed to kill timed-out container"
                    ),
                    Err(_) => warn!(
                        container = %short_id(container_id),
                        "killing timed-out container itself timed out"
                    ),
                }

                result.status = ExecutionStatus::Timeout;
                result.error = Some(format!(
                    "execution timed out after {}",
                    humantime::format_duration(run_timeout)
                ));
                result.logs = self.collect_logs(container_id).await;
                return;
            }
        };

        result.logs = self.collect_logs(container_id).await;

        match timeout_at(deadline, self.engine.copy_out(container_id, SANDBOX_OUT)).await {
            Ok(Ok(output_tar)) => {
                self.read_outputs(&output_tar, req, result).await;
            }
            Ok(Err(e)) => warn!(
                container = %short_id(container_id),
                error = %e,
                "failed to copy output from container"
            ),
            Err(_) => warn!(
                container = %short_id(container_id),
                "copying output from container timed out"
            ),
        }

        if exit_code == 0 {
            result.status = ExecutionStatus::Success;
        } else {
            result.status = ExecutionStatus::Failed;
            if result.error.is_none() {
                result.error = Some(format!("container exited with code {exit_code}"));
            }
        }
    }

    /// Extract the copied-out `/sandbox/out` tree, read `output.json` if
    /// it parses as JSON, and hand the files subdirectory to the artifact
    /// collector. Output failures are warnings, never execution failures.
    async fn read_outputs(&self, output_tar: &[u8], req: &RunRequest, result: &mut RunResult) {
        let execution_id = result.execution_id;

        let out_dir = match tempfile::Builder::new().prefix("skillbox-out-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(execution = %execution_id, error = %e, "failed to create output temp dir");
                return;
            }
        };

        if let Err(e) = extract_tar(output_tar, out_dir.path()) {
            warn!(execution = %execution_id, error = %e, "failed to extract container output");
            return;
        }

        // /sandbox/out copies out as an "out/" tree.
        let output_path = out_dir.path().join("out/output.json");
        match std::fs::read(&output_path) {
            Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => result.output = Some(value),
                Err(_) => {
                    warn!(execution = %execution_id, "output.json is not valid JSON, discarding");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(execution = %execution_id, error = %e, "failed to read output.json"),
        }

        let files_dir = out_dir.path().join("out/files");
        match self
            .artifacts
            .collect(&req.tenant_id, execution_id, &files_dir)
            .await
        {
            Ok((url, files)) => {
                result.files_url = url;
                result.files_list = files;
            }
            Err(e) => {
                warn!(execution = %execution_id, error = %e, "failed to collect artifacts");
            }
        }
    }

    /// Combined stdout+stderr, de-framed and capped, under a fresh bound.
    async fn collect_logs(&self, container_id: &str) -> String {
        match tokio::time::timeout(
            CLEANUP_TIMEOUT,
            self.engine.logs(container_id, self.settings.max_output_size),
        )
        .await
        {
            Ok(Ok(raw)) => strip_log_frames(&raw),
            Ok(Err(e)) => {
                warn!(container = %short_id(container_id), error = %e, "failed to read container logs");
                String::new()
            }
            Err(_) => {
                warn!(container = %short_id(container_id), "reading container logs timed out");
                String::new()
            }
        }
    }

    /// Force-remove the container under a fresh bound; failures are warnings.
    async fn remove_container(&self, container_id: &str) {
        match tokio::time::timeout(CLEANUP_TIMEOUT, self.engine.remove(container_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(container = %short_id(container_id), error = %e, "failed to remove container");
            }
            Err(_) => {
                warn!(container = %short_id(container_id), "container removal timed out");
            }
        }
    }

    /// Write the terminal record. Conditional on the row still running,
    /// so a late or duplicate completion is a no-op; failures never mask
    /// the result returned to the caller.
    async fn finish_record(&self, record: &Execution, result: &RunResult) {
        let mut update = record.clone();
        update.status = result.status;
        update.output = result.output.clone();
        update.logs = result.logs.clone();
        update.files_url = result.files_url.clone();
        update.files_list = result.files_list.clone();
        update.duration_ms = result.duration_ms;
        update.error = result.error.clone();
        update.finished_at = Some(chrono::Utc::now());

        match self.executions.complete(&update).await {
            Ok(true) => {}
            Ok(false) => debug!(execution = %record.id, "execution record already terminal"),
            Err(e) => {
                warn!(execution = %record.id, error = %e, "failed to update execution record");
            }
        }
    }
}

/// First 12 characters of a container id, for log output.
fn short_id(id: &str) -> &str {
    if id.len() > 12 { &id[..12] } else { id }
}
