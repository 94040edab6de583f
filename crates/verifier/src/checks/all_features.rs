//! Every feature working together in the example allocation.

use tracing::info;

use super::{require_task_running, CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result, VerifyError};

const INDEX_PAGE: &str = "local/index.html";

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    ctx.running_job().await?;
    let allocation = ctx.first_allocation().await?;
    for task in expect.required_tasks() {
        require_task_running(&allocation, task)?;
    }

    let page = ctx
        .nomad
        .read_alloc_file(&allocation.id, INDEX_PAGE)
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to verify HTML content: {e}")))?;
    for feature in &expect.features {
        require(
            page.contains(feature.as_str()),
            format!("Feature '{feature}' not found in HTML content"),
        )?;
    }

    let pods = ctx.cluster.list_pods(&expect.managed_selector).await?;
    let pod = require_some(pods.first(), "No Nomad-managed pods found in Kubernetes")?;
    require(
        pod.annotation("prometheus.io/scrape").is_some(),
        "Prometheus annotation missing - metrics integration issue",
    )?;
    require(
        pod.label("managed-by").is_some(),
        "managed-by label missing - OPA policy integration issue",
    )?;
    require(
        pod.label("mantl-service").is_some(),
        "mantl-service label missing - service discovery integration issue",
    )?;

    let container = require_some(pod.containers.first(), "No containers found in pod")?;
    require(
        container.limit("cpu").is_some(),
        "CPU limit missing - resource management issue",
    )?;
    require(
        container.limit("memory").is_some(),
        "Memory limit missing - resource management issue",
    )?;
    if let Some(limit) = container.limit(&expect.gpu_resource) {
        require(
            limit == expect.gpu_limit,
            "Incorrect GPU limit - GPU integration issue",
        )?;
    }

    let security = require_some(
        container.security,
        "Security context missing - OPA policy integration issue",
    )?;
    require(
        security.run_as_non_root == Some(true),
        "run_as_non_root should be True - OPA policy integration issue",
    )?;
    require(
        security.allow_privilege_escalation == Some(false),
        "allow_privilege_escalation should be False - OPA policy integration issue",
    )?;

    info!(allocation = %allocation.id, pod = %pod.name, "All features integrated");
    Ok(CheckOutcome::Passed)
}
