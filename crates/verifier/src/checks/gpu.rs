//! GPU workload scheduling.

use tracing::info;

use super::{CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result};
use crate::nomad::find_device;

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    let job = ctx.running_job().await?;
    require(!job.task_groups.is_empty(), "No task groups found in job")?;
    let task = require_some(
        job.find_task(&expect.primary_task),
        format!("{} task not found in job", expect.primary_task),
    )?;

    let devices = task.devices();
    require(!devices.is_empty(), "No devices found in task resources")?;
    let gpu = require_some(
        find_device(devices, &expect.gpu_device),
        "No GPU device found in task resources",
    )?;
    require(gpu.count > 0, "GPU count is not greater than 0")?;

    require(
        task.config_str("pod_spec")
            .is_some_and(|spec| spec.contains(&expect.gpu_resource)),
        "GPU resource not found in Kubernetes pod spec",
    )?;

    let pods = ctx.app_pods().await?;
    let container = require_some(pods[0].containers.first(), "No containers found in pod")?;
    let limit = require_some(
        container.limit(&expect.gpu_resource),
        "GPU limit not found in container resources",
    )?;
    require(
        limit == expect.gpu_limit,
        format!("Unexpected GPU limit value: {limit}"),
    )?;

    info!(device = %gpu.name, count = gpu.count, "GPU request reached the pod");
    Ok(CheckOutcome::Passed)
}
