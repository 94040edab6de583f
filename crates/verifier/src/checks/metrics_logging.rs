//! Federated metrics and logging.

use tracing::info;

use super::{require_task_running, CheckContext, CheckOutcome};
use crate::error::{require, Result, VerifyError};

const PROMETHEUS_SERIES: [&str; 2] = [
    "nomad_client_allocated_cpu",
    "nomad_client_allocated_memory",
];

const FLUENTD_CONFIG: &str = "local/fluentd.conf";

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    let metrics = ctx
        .nomad
        .metrics()
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to get metrics from Nomad: {e}")))?;
    require(metrics.gauges.is_some(), "Gauge metrics not found")?;
    require(metrics.mentions("nomad"), "Nomad metrics not found")?;
    require(metrics.mentions("runtime"), "Runtime metrics not found")?;

    let exposition = ctx.nomad.prometheus_metrics().await.map_err(|e| {
        VerifyError::Assertion(format!("Failed to get Prometheus metrics from Nomad: {e}"))
    })?;
    for series in PROMETHEUS_SERIES {
        require(
            exposition.contains(series),
            format!("{series} not found in Prometheus metrics"),
        )?;
    }

    let services = ctx.cluster.list_services(&expect.app_selector).await?;
    require(
        !services.is_empty(),
        format!(
            "No services found in Kubernetes with {} label",
            expect.app_selector
        ),
    )?;

    let pods = ctx.app_pods().await?;
    let pod = &pods[0];
    require(
        pod.annotation("prometheus.io/scrape").is_some(),
        "Prometheus scrape annotation not found",
    )?;
    require(
        pod.annotation("prometheus.io/scrape") == Some("true"),
        "Prometheus scrape not enabled",
    )?;
    require(
        pod.annotation("prometheus.io/port").is_some(),
        "Prometheus port annotation not found",
    )?;

    let allocation = ctx.first_allocation().await?;
    require_task_running(&allocation, &expect.logging_task)?;

    let exists = ctx
        .nomad
        .alloc_file_exists(&allocation.id, FLUENTD_CONFIG)
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to verify fluentd config: {e}")))?;
    require(exists, "Fluentd config file not found")?;

    info!(pod = %pod.name, "Metrics and logging federated");
    Ok(CheckOutcome::Passed)
}
