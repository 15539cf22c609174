//! Docker container engine.
//!
//! Implements the [`ContainerEngine`] port with bollard. Each trait method
//! is one engine API call; deadlines are the runner's responsibility.

use std::collections::HashMap;

use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, DownloadFromContainerOptionsBuilder, KillContainerOptionsBuilder,
    ListContainersOptionsBuilder, LogsOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, UploadToContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::StreamExt;
use skillbox_core::engine::{ContainerEngine, ContainerSpec, ContainerSummary};
use skillbox_types::error::EngineError;
use tracing::warn;

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`ContainerEngine`] backed by a Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the engine. An empty host uses the platform defaults
    /// (honoring `DOCKER_HOST`); `unix://` and `tcp://`/`http://` hosts
    /// are dialed explicitly.
    pub fn connect(host: &str) -> Result<Self, EngineError> {
        let docker = if host.is_empty() {
            Docker::connect_with_local_defaults()
        } else if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_socket(path, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(engine_error)?;

        Ok(Self { docker })
    }
}

fn engine_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Backend(e.to_string())
}

impl ContainerEngine for DockerEngine {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let host_config = HostConfig {
            network_mode: Some(spec.network_mode.clone()),
            cap_drop: Some(spec.cap_drop.clone()),
            security_opt: Some(spec.security_opt.clone()),
            memory: Some(spec.memory_bytes),
            memory_swap: Some(spec.memory_swap_bytes),
            cpu_quota: Some(spec.cpu_quota),
            cpu_period: Some(spec.cpu_period),
            pids_limit: Some(spec.pids_limit),
            tmpfs: Some(spec.tmpfs.clone()),
            auto_remove: Some(spec.auto_remove),
            ..HostConfig::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            user: Some(spec.user.clone()),
            working_dir: Some(spec.working_dir.clone()),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions>, body)
            .await
            .map_err(engine_error)?;

        Ok(response.id)
    }

    async fn copy_in(&self, id: &str, dest: &str, archive: Vec<u8>) -> Result<(), EngineError> {
        let options = UploadToContainerOptionsBuilder::new().path(dest).build();
        self.docker
            .upload_to_container(id, Some(options), bollard::body_full(archive.into()))
            .await
            .map_err(engine_error)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(engine_error)
    }

    async fn wait(&self, id: &str) -> Result<i64, EngineError> {
        let options = WaitContainerOptionsBuilder::new()
            .condition("not-running")
            .build();
        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as a typed error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(engine_error(e)),
            None => Err(EngineError::Backend(
                "wait stream ended without a response".to_string(),
            )),
        }
    }

    async fn logs(&self, id: &str, max_bytes: i64) -> Result<Vec<u8>, EngineError> {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .timestamps(false)
            .build();
        let mut stream = self.docker.logs(id, Some(options));

        let cap = max_bytes.max(0) as usize;
        let mut collected = Vec::new();

        while let Some(frame) = stream.next().await {
            match frame {
                Ok(output) => {
                    let bytes = output.into_bytes();
                    let remaining = cap.saturating_sub(collected.len());
                    if remaining == 0 {
                        break;
                    }
                    collected.extend_from_slice(&bytes[..bytes.len().min(remaining)]);
                }
                Err(e) => {
                    warn!(container = %id, error = %e, "log stream ended early");
                    break;
                }
            }
        }

        Ok(collected)
    }

    async fn copy_out(&self, id: &str, src: &str) -> Result<Vec<u8>, EngineError> {
        let options = DownloadFromContainerOptionsBuilder::new().path(src).build();
        let mut stream = self.docker.download_from_container(id, Some(options));

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk.map_err(engine_error)?);
        }

        Ok(archive)
    }

    async fn kill(&self, id: &str, signal: &str) -> Result<(), EngineError> {
        let options = KillContainerOptionsBuilder::new().signal(signal).build();
        self.docker
            .kill_container(id, Some(options))
            .await
            .map_err(engine_error)
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptionsBuilder::new().force(true).v(true).build();
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(engine_error)
    }

    async fn list_labeled(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let filters = HashMap::from([("label".to_string(), vec![format!("{key}={value}")])]);
        let options = ListContainersOptionsBuilder::new()
            .all(true)
            .filters(&filters)
            .build();

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(engine_error)?;

        Ok(containers
            .into_iter()
            .map(|container| ContainerSummary {
                id: container.id.unwrap_or_default(),
                image: container.image.unwrap_or_default(),
                status: container.status.unwrap_or_default(),
            })
            .collect())
    }
}
