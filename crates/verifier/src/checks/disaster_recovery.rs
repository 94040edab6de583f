//! Disaster recovery with automatic failover.

use tracing::{info, warn};

use super::{require_all, CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result};

const DR_CONFIG_MARKERS: [&str; 4] = [
    "disaster_recovery {",
    "recovery_threshold",
    "snapshot_path",
    "snapshot_interval",
];

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let job = ctx.running_job().await?;
    let recovery = require_some(
        job.disaster_recovery.as_ref(),
        "Disaster recovery configuration not found in job",
    )?;
    require(
        recovery.max_disconnect.as_ref().is_some_and(|v| !v.is_null()),
        "MaxDisconnect not found in DR config",
    )?;
    require(
        recovery.auto_revert == Some(true),
        "AutoRevert should be enabled",
    )?;

    let config = ctx.integration_config().await?;
    require_all(&config, &DR_CONFIG_MARKERS, "disaster recovery config")?;

    let snapshot_dir = &ctx.config.paths.snapshot_dir;
    require(
        tokio::fs::metadata(snapshot_dir)
            .await
            .is_ok_and(|meta| meta.is_dir()),
        format!("Snapshot directory {} does not exist", snapshot_dir.display()),
    )?;

    // Snapshot creation is not available in every environment.
    match ctx.nomad.create_snapshot().await {
        Ok(()) => info!("Nomad snapshot created"),
        Err(e) => warn!(error = %e, "Snapshot creation failed"),
    }

    let agent = ctx.nomad.agent_self().await?;
    require(
        agent
            .config
            .server
            .as_ref()
            .and_then(|server| server.heartbeat_grace.as_ref())
            .is_some_and(|grace| !grace.is_null()),
        "HeartbeatGrace not found in server config",
    )?;

    info!("Disaster recovery configured");
    Ok(CheckOutcome::Passed)
}
