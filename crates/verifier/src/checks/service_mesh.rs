//! Service mesh and zero-downtime migration.

use tracing::info;

use super::{require_all, CheckContext, CheckOutcome};
use crate::consul::tagged_services;
use crate::error::{require, Result};

const MESH_CONFIG_MARKERS: [&str; 4] = [
    "service_mesh {",
    "enabled = true",
    "connect_sidecar_image",
    "metrics_enabled",
];

/// Tag fragment carried by every mantl-registered service.
const MANTL_TAG: &str = "mantl";

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    let config = ctx.integration_config().await?;
    require_all(&config, &MESH_CONFIG_MARKERS, "service mesh config")?;

    let job = ctx.running_job().await?;
    require(!job.task_groups.is_empty(), "No task groups found in job")?;
    require(job.services().next().is_some(), "No services found in job")?;
    require(
        job.services()
            .any(|service| service.name == expect.metrics_service_name),
        "Metrics service not found for service mesh monitoring",
    )?;
    for group in &job.task_groups {
        require(
            group.port(&expect.metrics_port_name).is_some(),
            format!("Metrics port not found in network configuration of {}", group.name),
        )?;
    }

    let catalog = ctx.consul.services().await?;
    ctx.consul.service(&expect.service_name).await?;
    let tagged = tagged_services(&catalog, MANTL_TAG);
    require(!tagged.is_empty(), "No tagged services found in Consul")?;

    let pods = ctx.app_pods().await?;
    require(
        pods[0]
            .containers
            .iter()
            .any(|container| container.exposes(&expect.metrics_port_name, expect.metrics_port)),
        "Metrics port not found in container configuration",
    )?;

    info!(tagged = ?tagged, "Service mesh wiring in place");
    Ok(CheckOutcome::Passed)
}
