//! Startup sweep for orphaned containers.

use skillbox_types::error::EngineError;
use tracing::{info, warn};

use crate::engine::{ContainerEngine, MANAGED_BY_KEY, MANAGED_BY_VALUE};

use super::short_id;

/// Find and force-remove containers labeled `managed-by=skillbox` that a
/// previous server instance left behind (crash, ungraceful shutdown).
/// Designed to run once at process start, before any execution is
/// admitted.
///
/// Per-container removal failures are logged and the sweep continues;
/// only a listing failure propagates. Returns the number of containers
/// removed.
pub async fn reap_orphans<E: ContainerEngine>(engine: &E) -> Result<usize, EngineError> {
    let orphans = engine.list_labeled(MANAGED_BY_KEY, MANAGED_BY_VALUE).await?;
    if orphans.is_empty() {
        return Ok(0);
    }

    info!(count = orphans.len(), "found orphaned skillbox container(s)");

    let mut removed = 0;
    for container in orphans {
        info!(
            container = %short_id(&container.id),
            image = %container.image,
            status = %container.status,
            "removing orphaned container"
        );
        match engine.remove(&container.id).await {
            Ok(()) => removed += 1,
            Err(e) => {
                warn!(
                    container = %short_id(&container.id),
                    error = %e,
                    "failed to remove orphaned container"
                );
            }
        }
    }

    Ok(removed)
}
