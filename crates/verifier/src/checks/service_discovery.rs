//! Cross-platform service discovery between Consul and Kubernetes.

use tracing::{debug, info};

use super::{CheckContext, CheckOutcome};
use crate::error::{require, require_some, Result, VerifyError};

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();
    ctx.running_job().await?;

    let services = ctx.consul.services().await?;
    require(
        services.contains_key(&expect.service_name),
        "Service not found in Consul",
    )?;

    let instances = ctx.consul.service(&expect.service_name).await?;
    let instance = require_some(instances.first(), "No service instances found")?;
    require(
        instance.has_tag(&expect.service_tag),
        format!("Service doesn't have {} tag", expect.service_tag),
    )?;

    let exported = ctx
        .cluster
        .list_services(&expect.discovery_selector)
        .await?;
    require(
        !exported.is_empty(),
        format!(
            "No services found in Kubernetes with {} label",
            expect.discovery_selector
        ),
    )?;

    for (key, value) in &expect.service_meta {
        require(
            instance.meta(key) == Some(value.as_str()),
            format!("Service metadata is incorrect: {key}"),
        )?;
    }

    let url = format!(
        "http://{}:{}",
        instance.endpoint_address(),
        instance.service_port
    );
    debug!(url = %url, "Probing registered service endpoint");
    let response = ctx
        .http
        .get(&url)
        .send()
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to connect to service: {e}")))?;
    require(
        response.status().is_success(),
        format!("Service is not responding: {}", response.status()),
    )?;

    info!(service = %expect.service_name, url = %url, "Service discoverable from both platforms");
    Ok(CheckOutcome::Passed)
}
