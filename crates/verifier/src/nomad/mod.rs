//! Nomad HTTP API access.
//!
//! [`JobStatusSource`] is the narrow surface the readiness poller needs;
//! [`NomadApi`] extends it with everything the federation checks read.

mod client;
pub mod models;

use async_trait::async_trait;

pub use client::NomadClient;
pub use models::{
    find_device, find_kubernetes_plugin, AgentConfig, AgentInfo, Allocation, DeviceRequest,
    DisasterRecovery, JobDescriptor, Metric, MetricsSummary, Multiregion, Network, Port,
    RegionSpec, ScalingBounds, ScalingPolicy, ServerSettings, ServiceStanza, Task, TaskGroup,
    TaskResources, TaskState, Template, RUNNING,
};

use crate::error::Result;

/// Job and allocation status lookups.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    /// Fetch a job by ID.
    async fn job(&self, job_id: &str) -> Result<JobDescriptor>;

    /// List the allocations of a job.
    async fn job_allocations(&self, job_id: &str) -> Result<Vec<Allocation>>;
}

/// Read access to a Nomad agent.
#[async_trait]
pub trait NomadApi: JobStatusSource {
    /// Fetch a single allocation with task states.
    async fn allocation(&self, alloc_id: &str) -> Result<Allocation>;

    /// Agent introspection.
    async fn agent_self(&self) -> Result<AgentInfo>;

    /// JSON metrics summary.
    async fn metrics(&self) -> Result<MetricsSummary>;

    /// Metrics in Prometheus exposition format.
    async fn prometheus_metrics(&self) -> Result<String>;

    /// Known regions.
    async fn regions(&self) -> Result<Vec<String>>;

    /// Registered scaling policies.
    async fn scaling_policies(&self) -> Result<Vec<ScalingPolicy>>;

    /// Ask the servers for a state snapshot.
    async fn create_snapshot(&self) -> Result<()>;

    /// Read a file from an allocation's directory.
    async fn read_alloc_file(&self, alloc_id: &str, path: &str) -> Result<String>;

    /// Whether a file exists in an allocation's directory.
    async fn alloc_file_exists(&self, alloc_id: &str, path: &str) -> Result<bool>;
}
