//! Autoscaling integration.

use tracing::{info, warn};

use super::{require_all, CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result};
use crate::nomad::ScalingBounds;

const AUTOSCALING_CONFIG_MARKERS: [&str; 3] = ["autoscaling {", "min_replicas", "max_replicas"];

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let job_id = &ctx.expect().job_id;

    let job = ctx.running_job().await?;
    let scaling = require_some(
        job.scaling.as_ref(),
        "Scaling configuration not found in job",
    )?;
    require_bounds(scaling, "scaling config")?;

    let agent = ctx.nomad.agent_self().await?;
    require(
        agent.config.kubernetes_plugin().is_some(),
        "Kubernetes plugin not found in Nomad config",
    )?;

    let from_file = match ctx.integration_config().await {
        Ok(config) => require_all(
            &config,
            &AUTOSCALING_CONFIG_MARKERS,
            "Kubernetes integration config",
        ),
        Err(e) => Err(e),
    };

    if let Err(e) = from_file {
        warn!(error = %e, "Autoscaling config not confirmed on disk, checking the scaling API");

        let allocations = ctx.nomad.job_allocations(job_id).await?;
        require(!allocations.is_empty(), "No allocations found for job")?;

        let policies = ctx.nomad.scaling_policies().await?;
        match policies.iter().find(|policy| policy.targets_job(job_id)) {
            Some(policy) => {
                require(policy.min.is_some(), "Min value not found in scaling policy")?;
                require(policy.max.is_some(), "Max value not found in scaling policy")?;
            }
            None => require_bounds(scaling, "job scaling config")?,
        }
    }

    info!(min = ?scaling.min, max = ?scaling.max, "Autoscaling configured");
    Ok(CheckOutcome::Passed)
}

fn require_bounds(bounds: &ScalingBounds, context: &str) -> Result<()> {
    require(
        bounds.min.is_some(),
        format!("Min value not found in {context}"),
    )?;
    require(
        bounds.max.is_some(),
        format!("Max value not found in {context}"),
    )
}
