//! Custom resource definition support.

use tracing::{info, warn};

use super::{require_all, CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result};
use crate::kubernetes::{CustomObjectListing, CustomResourceRef};

const CRD_CONFIG_MARKERS: [&str; 4] = [
    "custom_resources =",
    "custom_resource_groups",
    "monitoring.coreos.com",
    "cert-manager.io",
];

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    let job = ctx.running_job().await?;
    require(!job.task_groups.is_empty(), "No task groups found in job")?;
    let task = require_some(
        job.find_task(&expect.primary_task),
        format!("{} task not found in job", expect.primary_task),
    )?;
    require(
        task.config_mentions("custom_resources"),
        "custom_resources not found in task config",
    )?;

    let config = ctx.integration_config().await?;
    require_all(&config, &CRD_CONFIG_MARKERS, "Kubernetes integration config")?;

    let resource = CustomResourceRef::service_monitors();
    match ctx.cluster.list_custom_objects(&resource).await {
        Ok(CustomObjectListing::Present(names)) => {
            if names.iter().any(|name| *name == expect.app_label) {
                info!(name = %expect.app_label, "ServiceMonitor created from job");
            } else {
                info!(
                    count = names.len(),
                    "ServiceMonitor API available but no example resources found"
                );
            }
        }
        Ok(CustomObjectListing::Absent) => {
            info!(group = %resource.group, "ServiceMonitor API not installed");
        }
        Err(e) => {
            warn!(error = %e, "Could not list ServiceMonitors, checking pod labels instead");
            let pods = ctx.app_pods().await?;
            let pod = &pods[0];
            require(
                pod.label("app").is_some(),
                "app label not found in pod metadata",
            )?;
            require(
                pod.label("app") == Some(expect.app_label.as_str()),
                "Unexpected app label value",
            )?;
        }
    }

    Ok(CheckOutcome::Passed)
}
