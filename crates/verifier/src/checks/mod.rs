//! Cross-subsystem federation checks.
//!
//! Each check is an independent async function over a [`CheckContext`]. A
//! check returns `Ok` when every assertion holds, [`VerifyError::Assertion`]
//! on the first failed assertion, and any other error when a fetch failed.

mod all_features;
mod autoscaling;
mod crd;
mod disaster_recovery;
mod gpu;
mod metrics_logging;
mod multi_region;
mod opa;
mod service_discovery;
mod service_mesh;
mod vault_secrets;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Expectations, VerifierConfig};
use crate::consul::ServiceRegistry;
use crate::error::{require, require_some, Result, VerifyError};
use crate::kubernetes::{ClusterApi, PodRecord};
use crate::nomad::{Allocation, JobDescriptor, NomadApi};
use crate::vault::SecretStore;

/// Outcome of a check that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Skipped(String),
}

/// Clients and configuration shared by the checks.
#[derive(Clone)]
pub struct CheckContext {
    pub nomad: Arc<dyn NomadApi>,
    pub consul: Arc<dyn ServiceRegistry>,
    pub vault: Arc<dyn SecretStore>,
    pub cluster: Arc<dyn ClusterApi>,
    /// Plain HTTP client for probing registered service endpoints.
    pub http: reqwest::Client,
    pub config: VerifierConfig,
}

impl CheckContext {
    #[must_use]
    pub fn expect(&self) -> &Expectations {
        &self.config.expectations
    }

    /// Fetch the example job and require it to be running.
    pub(crate) async fn running_job(&self) -> Result<JobDescriptor> {
        let job = self.nomad.job(&self.expect().job_id).await?;
        require(job.is_running(), "Example job is not running")?;
        Ok(job)
    }

    /// Fetch the first allocation of the example job with its task states.
    pub(crate) async fn first_allocation(&self) -> Result<Allocation> {
        let allocations = self.nomad.job_allocations(&self.expect().job_id).await?;
        let first = require_some(
            allocations.first(),
            "No allocations found for example job",
        )?;
        self.nomad.allocation(&first.id).await
    }

    /// Pods matching the example app selector, requiring at least one.
    pub(crate) async fn app_pods(&self) -> Result<Vec<PodRecord>> {
        let selector = &self.expect().app_selector;
        let pods = self.cluster.list_pods(selector).await?;
        require(
            !pods.is_empty(),
            format!("No pods found in Kubernetes with {selector} label"),
        )?;
        Ok(pods)
    }

    /// Read the Nomad Kubernetes integration config from disk.
    pub(crate) async fn integration_config(&self) -> Result<String> {
        read_file(&self.config.paths.integration_config).await
    }
}

/// Read a local file into a string.
pub(crate) async fn read_file(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "Reading file");
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| VerifyError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Require `content` to contain every needle, naming the first one missing.
pub(crate) fn require_all(content: &str, needles: &[&str], context: &str) -> Result<()> {
    for needle in needles {
        require(
            content.contains(needle),
            format!("{needle} not found in {context}"),
        )?;
    }
    Ok(())
}

/// Require the named task to be running in the allocation.
pub(crate) fn require_task_running(allocation: &Allocation, task: &str) -> Result<()> {
    require(
        allocation.task_state(task).is_some(),
        format!("{task} task not found in allocation"),
    )?;
    require(
        allocation.task_running(task),
        format!("{task} task not running"),
    )
}

/// Identifier of a live check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckId {
    ServiceDiscovery,
    Vault,
    MetricsLogging,
    Opa,
    MultiRegion,
    Crd,
    ServiceMesh,
    Autoscaling,
    Gpu,
    DisasterRecovery,
    AllFeatures,
}

impl CheckId {
    /// Every check in execution order.
    pub const ALL: [CheckId; 11] = [
        CheckId::ServiceDiscovery,
        CheckId::Vault,
        CheckId::MetricsLogging,
        CheckId::Opa,
        CheckId::MultiRegion,
        CheckId::Crd,
        CheckId::ServiceMesh,
        CheckId::Autoscaling,
        CheckId::Gpu,
        CheckId::DisasterRecovery,
        CheckId::AllFeatures,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ServiceDiscovery => "service-discovery",
            Self::Vault => "vault",
            Self::MetricsLogging => "metrics-logging",
            Self::Opa => "opa",
            Self::MultiRegion => "multi-region",
            Self::Crd => "crd",
            Self::ServiceMesh => "service-mesh",
            Self::Autoscaling => "autoscaling",
            Self::Gpu => "gpu",
            Self::DisasterRecovery => "disaster-recovery",
            Self::AllFeatures => "all-features",
        }
    }

    /// One-line description for listings.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::ServiceDiscovery => "Consul and Kubernetes both expose the example service",
            Self::Vault => "Vault secrets are readable, rendered and writable",
            Self::MetricsLogging => "Nomad metrics, Prometheus annotations and the logging sidecar",
            Self::Opa => "OPA policy agent is running with the admission policy",
            Self::MultiRegion => "Region and multi-region job configuration",
            Self::Crd => "Custom resources are configured and served",
            Self::ServiceMesh => "Service mesh config and metrics ports",
            Self::Autoscaling => "Scaling bounds and the Kubernetes plugin",
            Self::Gpu => "GPU device requests reach the Kubernetes pod",
            Self::DisasterRecovery => "Disaster recovery policy and snapshots",
            Self::AllFeatures => "Every feature works together in one allocation",
        }
    }

    /// Run this check.
    pub async fn run(self, ctx: &CheckContext) -> Result<CheckOutcome> {
        match self {
            Self::ServiceDiscovery => service_discovery::run(ctx).await,
            Self::Vault => vault_secrets::run(ctx).await,
            Self::MetricsLogging => metrics_logging::run(ctx).await,
            Self::Opa => opa::run(ctx).await,
            Self::MultiRegion => multi_region::run(ctx).await,
            Self::Crd => crd::run(ctx).await,
            Self::ServiceMesh => service_mesh::run(ctx).await,
            Self::Autoscaling => autoscaling::run(ctx).await,
            Self::Gpu => gpu::run(ctx).await,
            Self::DisasterRecovery => disaster_recovery::run(ctx).await,
            Self::AllFeatures => all_features::run(ctx).await,
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckId {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| VerifyError::Config(format!("unknown check: {s}")))
    }
}
