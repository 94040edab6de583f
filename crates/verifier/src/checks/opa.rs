//! Unified policy enforcement with OPA.

use tracing::{info, warn};

use super::{require_all, require_task_running, CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result};

const REGO_POLICY: &str = "local/policies/kubernetes.rego";
const ADMISSION_PACKAGE: &str = "package kubernetes.admission";
const POLICY_CONFIG_MARKERS: [&str; 4] = [
    "policy {",
    "opa_url",
    "evaluation_paths",
    "kubernetes/admission",
];

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    let job = ctx.running_job().await?;
    require(!job.task_groups.is_empty(), "No task groups found in job")?;
    let policy_task = require_some(
        job.find_task(&expect.policy_task),
        "Policy agent task not found in job",
    )?;
    require(
        policy_task
            .image()
            .is_some_and(|image| image.starts_with(&expect.opa_image_prefix)),
        "Unexpected OPA image",
    )?;

    let allocation = ctx.first_allocation().await?;
    require_task_running(&allocation, &expect.policy_task)?;

    let rego_present = match ctx
        .nomad
        .alloc_file_exists(&allocation.id, REGO_POLICY)
        .await
    {
        Ok(present) => present,
        Err(e) => {
            warn!(error = %e, "Could not stat Rego policy file");
            false
        }
    };
    if !rego_present {
        warn!(path = REGO_POLICY, "Rego policy file not visible, checking task templates");
        require(
            policy_task.templates_embed(ADMISSION_PACKAGE),
            "Kubernetes admission policy not found in templates",
        )?;
    }

    let config = ctx.integration_config().await?;
    require_all(&config, &POLICY_CONFIG_MARKERS, "Kubernetes integration config")?;

    info!(task = %expect.policy_task, "Policy enforcement configured");
    Ok(CheckOutcome::Passed)
}
