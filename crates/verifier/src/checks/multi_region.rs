//! Multi-region orchestration.

use tracing::info;

use super::{CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result, VerifyError};

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let region = &ctx.expect().region;

    let agent = ctx
        .nomad
        .agent_self()
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to get server info: {e}")))?;
    let agent_region = require_some(
        agent.config.region.as_deref(),
        "Region not found in Nomad configuration",
    )?;
    require(
        agent_region == region,
        format!("Unexpected region: {agent_region}"),
    )?;
    require(
        agent
            .config
            .server
            .as_ref()
            .and_then(|server| server.enable_multi_region)
            .unwrap_or(false),
        "Multi-region is not enabled",
    )?;

    let job = ctx.nomad.job(&ctx.expect().job_id).await?;
    let multiregion = require_some(
        job.multiregion.as_ref(),
        "Multiregion config not found in job",
    )?;
    require(
        multiregion.strategy.as_ref().is_some_and(|s| !s.is_null()),
        "Strategy not found in multiregion config",
    )?;
    require(
        !multiregion.regions.is_empty(),
        "No regions found in multiregion config",
    )?;
    require(
        multiregion.has_region(region),
        format!("{region} region not found in job config"),
    )?;

    let regions = ctx
        .nomad
        .regions()
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to get regions: {e}")))?;
    require(
        regions.iter().any(|r| r == region),
        format!("{region} region not found in regions list"),
    )?;

    let recovery = require_some(
        job.disaster_recovery.as_ref(),
        "Disaster recovery config not found in job",
    )?;
    require(
        recovery.max_disconnect.as_ref().is_some_and(|v| !v.is_null()),
        "MaxDisconnect not found in DR config",
    )?;
    require(
        recovery.auto_revert == Some(true),
        "AutoRevert not enabled in DR config",
    )?;

    info!(region = %region, regions = multiregion.regions.len(), "Multi-region orchestration configured");
    Ok(CheckOutcome::Passed)
}
