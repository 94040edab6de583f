//! Nomad API wire types.
//!
//! Only the fields the checks read are modelled. Nomad serializes empty lists
//! and maps as `null`, so collection fields go through [`nullable`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Status string Nomad reports for running jobs, allocations and tasks.
pub const RUNNING: &str = "running";

/// Deserialize `null` as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A registered job (`GET /v1/job/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobDescriptor {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub task_groups: Vec<TaskGroup>,
    #[serde(default)]
    pub scaling: Option<ScalingBounds>,
    #[serde(default)]
    pub multiregion: Option<Multiregion>,
    #[serde(default)]
    pub disaster_recovery: Option<DisasterRecovery>,
}

impl JobDescriptor {
    /// Whether the job reports running status.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RUNNING
    }

    /// First task with the given name across all task groups.
    #[must_use]
    pub fn find_task(&self, name: &str) -> Option<&Task> {
        self.task_groups
            .iter()
            .flat_map(|group| &group.tasks)
            .find(|task| task.name == name)
    }

    /// Names of every task in the job.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.task_groups
            .iter()
            .flat_map(|group| &group.tasks)
            .map(|task| task.name.as_str())
            .collect()
    }

    /// Every service stanza declared by the job's groups.
    pub fn services(&self) -> impl Iterator<Item = &ServiceStanza> {
        self.task_groups.iter().flat_map(|group| &group.services)
    }
}

/// A task group within a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tasks: Vec<Task>,
    #[serde(default, deserialize_with = "nullable")]
    pub services: Vec<ServiceStanza>,
    #[serde(default, deserialize_with = "nullable")]
    pub networks: Vec<Network>,
}

impl TaskGroup {
    /// Port with the given label in the group's first network.
    #[must_use]
    pub fn port(&self, label: &str) -> Option<&Port> {
        self.networks.first().and_then(|network| {
            network
                .dynamic_ports
                .iter()
                .chain(&network.reserved_ports)
                .find(|port| port.label == label)
        })
    }
}

/// A task within a task group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub driver: String,
    /// Driver-specific configuration, kept untyped.
    #[serde(default, deserialize_with = "nullable")]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub resources: Option<TaskResources>,
    #[serde(default, deserialize_with = "nullable")]
    pub templates: Vec<Template>,
}

impl Task {
    /// Container image from the driver config.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.config_str("image")
    }

    /// A string value from the driver config.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Whether the serialized driver config mentions `needle` anywhere.
    #[must_use]
    pub fn config_mentions(&self, needle: &str) -> bool {
        serde_json::to_string(&self.config)
            .map(|rendered| rendered.contains(needle))
            .unwrap_or(false)
    }

    /// Devices requested by the task.
    #[must_use]
    pub fn devices(&self) -> &[DeviceRequest] {
        self.resources
            .as_ref()
            .map_or(&[][..], |resources| resources.devices.as_slice())
    }

    /// Whether any template embeds `needle`.
    #[must_use]
    pub fn templates_embed(&self, needle: &str) -> bool {
        self.templates
            .iter()
            .any(|template| template.embedded_tmpl.contains(needle))
    }
}

/// Find the first device whose name contains `pattern`.
#[must_use]
pub fn find_device<'a>(devices: &'a [DeviceRequest], pattern: &str) -> Option<&'a DeviceRequest> {
    devices.iter().find(|device| device.name.contains(pattern))
}

/// Resources requested by a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskResources {
    #[serde(rename = "CPU", default)]
    pub cpu: Option<i64>,
    #[serde(rename = "MemoryMB", default)]
    pub memory_mb: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub devices: Vec<DeviceRequest>,
}

/// A device request (`vendor/type[/model]` and count).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

/// A task template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(default)]
    pub embedded_tmpl: String,
    #[serde(default)]
    pub dest_path: String,
}

/// A service stanza in a task group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceStanza {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port_label: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

/// Group network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Network {
    #[serde(default, deserialize_with = "nullable")]
    pub dynamic_ports: Vec<Port>,
    #[serde(default, deserialize_with = "nullable")]
    pub reserved_ports: Vec<Port>,
}

/// A labelled network port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Port {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: Option<u16>,
    #[serde(default)]
    pub to: Option<i32>,
}

/// Scaling bounds declared on the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalingBounds {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl ScalingBounds {
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }
}

/// Multi-region deployment block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Multiregion {
    /// Either a strategy name or a strategy object depending on Nomad version.
    #[serde(default)]
    pub strategy: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub regions: Vec<RegionSpec>,
}

impl Multiregion {
    #[must_use]
    pub fn has_region(&self, name: &str) -> bool {
        self.regions.iter().any(|region| region.name == name)
    }
}

/// A region entry in a multi-region block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegionSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: Option<u32>,
}

/// Disaster recovery policy attached to the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisasterRecovery {
    /// Duration string or nanoseconds.
    #[serde(default)]
    pub max_disconnect: Option<Value>,
    #[serde(default)]
    pub auto_revert: Option<bool>,
}

/// An allocation, from either the job allocation list or the detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "JobID", default)]
    pub job_id: String,
    #[serde(default)]
    pub client_status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub task_states: BTreeMap<String, TaskState>,
}

impl Allocation {
    /// Whether the client reports this allocation as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.client_status == RUNNING
    }

    /// State of the named task, if the task exists.
    #[must_use]
    pub fn task_state(&self, task: &str) -> Option<&str> {
        self.task_states.get(task).map(|state| state.state.as_str())
    }

    /// Whether the named task is running.
    #[must_use]
    pub fn task_running(&self, task: &str) -> bool {
        self.task_state(task) == Some(RUNNING)
    }
}

/// Per-task state within an allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    /// `pending`, `running` or `dead`.
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub failed: bool,
}

/// Agent introspection (`GET /v1/agent/self`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(default)]
    pub config: AgentConfig,
}

/// The agent's effective configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub server: Option<ServerSettings>,
    /// Plugin configuration, a map keyed by plugin name or a list of
    /// `{ "Name": ... }` blocks depending on the agent version.
    #[serde(default)]
    pub plugins: Value,
}

impl AgentConfig {
    /// Locate the Kubernetes plugin block.
    #[must_use]
    pub fn kubernetes_plugin(&self) -> Option<&Value> {
        find_kubernetes_plugin(&self.plugins)
    }
}

/// Locate a plugin whose name mentions `kubernetes` in either plugin layout.
#[must_use]
pub fn find_kubernetes_plugin(plugins: &Value) -> Option<&Value> {
    match plugins {
        Value::Object(map) => map.get("kubernetes").or_else(|| {
            map.iter()
                .find(|(name, _)| name.to_lowercase().contains("kubernetes"))
                .map(|(_, plugin)| plugin)
        }),
        Value::Array(list) => list.iter().find(|plugin| {
            plugin
                .get("Name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase().contains("kubernetes"))
        }),
        _ => None,
    }
}

/// Server settings exposed by `agent/self`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSettings {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub enable_multi_region: Option<bool>,
    #[serde(default)]
    pub heartbeat_grace: Option<Value>,
}

/// JSON metrics summary (`GET /v1/metrics`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricsSummary {
    #[serde(default)]
    pub timestamp: Option<String>,
    /// `None` when the agent returned no gauge section at all.
    #[serde(default)]
    pub gauges: Option<Vec<Metric>>,
    #[serde(default, deserialize_with = "nullable")]
    pub counters: Vec<Metric>,
    #[serde(default, deserialize_with = "nullable")]
    pub samples: Vec<Metric>,
}

impl MetricsSummary {
    /// Whether any gauge, counter or sample name contains `fragment`.
    #[must_use]
    pub fn mentions(&self, fragment: &str) -> bool {
        self.gauges
            .iter()
            .flatten()
            .chain(&self.counters)
            .chain(&self.samples)
            .any(|metric| metric.name.contains(fragment))
    }
}

/// A single metric entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metric {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// A scaling policy stub (`GET /v1/scaling/policies`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalingPolicy {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub target: BTreeMap<String, String>,
}

impl ScalingPolicy {
    /// Whether the policy targets the given job.
    #[must_use]
    pub fn targets_job(&self, job_id: &str) -> bool {
        self.target.get("Job").map(String::as_str) == Some(job_id)
    }
}
