//! Shared fakes and fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mantl_verify::checks::CheckContext;
use mantl_verify::config::FEATURES;
use mantl_verify::consul::{ServiceCatalog, ServiceRecord, ServiceRegistry};
use mantl_verify::kubernetes::{
    ClusterApi, ClusterService, ContainerRecord, CustomObjectListing, CustomResourceRef,
    PodRecord, SecurityRecord,
};
use mantl_verify::nomad::{
    AgentInfo, Allocation, JobDescriptor, JobStatusSource, MetricsSummary, NomadApi,
    ScalingPolicy,
};
use mantl_verify::vault::{HealthStatus, SecretRecord, SecretStore};
use mantl_verify::{Result, VerifierConfig, VerifyError};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const JOB_ID: &str = "mantl-kubernetes-example";
pub const ALLOC_ID: &str = "8f3c2a51-alloc";

// =============================================================================
// Nomad
// =============================================================================

#[derive(Clone, Default)]
pub struct FakeNomad {
    pub job: JobDescriptor,
    pub allocations: Vec<Allocation>,
    pub agent: AgentInfo,
    pub metrics: MetricsSummary,
    pub prometheus: String,
    pub regions: Vec<String>,
    pub policies: Vec<ScalingPolicy>,
    pub snapshot_fails: bool,
    /// Allocation files by path relative to the allocation directory.
    pub files: BTreeMap<String, String>,
}

#[async_trait]
impl JobStatusSource for FakeNomad {
    async fn job(&self, job_id: &str) -> Result<JobDescriptor> {
        if job_id == self.job.id {
            Ok(self.job.clone())
        } else {
            Err(VerifyError::NotFound(format!("job not found: {job_id}")))
        }
    }

    async fn job_allocations(&self, _job_id: &str) -> Result<Vec<Allocation>> {
        Ok(self.allocations.clone())
    }
}

#[async_trait]
impl NomadApi for FakeNomad {
    async fn allocation(&self, alloc_id: &str) -> Result<Allocation> {
        self.allocations
            .iter()
            .find(|alloc| alloc.id == alloc_id)
            .cloned()
            .ok_or_else(|| VerifyError::NotFound(format!("alloc not found: {alloc_id}")))
    }

    async fn agent_self(&self) -> Result<AgentInfo> {
        Ok(self.agent.clone())
    }

    async fn metrics(&self) -> Result<MetricsSummary> {
        Ok(self.metrics.clone())
    }

    async fn prometheus_metrics(&self) -> Result<String> {
        Ok(self.prometheus.clone())
    }

    async fn regions(&self) -> Result<Vec<String>> {
        Ok(self.regions.clone())
    }

    async fn scaling_policies(&self) -> Result<Vec<ScalingPolicy>> {
        Ok(self.policies.clone())
    }

    async fn create_snapshot(&self) -> Result<()> {
        if self.snapshot_fails {
            Err(VerifyError::Api {
                status: 500,
                message: "snapshot not supported".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn read_alloc_file(&self, _alloc_id: &str, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| VerifyError::NotFound(format!("file not found: {path}")))
    }

    async fn alloc_file_exists(&self, _alloc_id: &str, path: &str) -> Result<bool> {
        Ok(self.files.contains_key(path))
    }
}

// =============================================================================
// Consul
// =============================================================================

#[derive(Clone, Default)]
pub struct FakeConsul {
    pub catalog: ServiceCatalog,
    pub records: BTreeMap<String, Vec<ServiceRecord>>,
}

#[async_trait]
impl ServiceRegistry for FakeConsul {
    async fn services(&self) -> Result<ServiceCatalog> {
        Ok(self.catalog.clone())
    }

    async fn service(&self, name: &str) -> Result<Vec<ServiceRecord>> {
        Ok(self.records.get(name).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Vault
// =============================================================================

#[derive(Clone, Default)]
pub struct FakeVault {
    pub health: HealthStatus,
    pub policies: Vec<String>,
    /// Secret data keyed by `mount/path`.
    pub secrets: Arc<Mutex<BTreeMap<String, BTreeMap<String, Value>>>>,
    /// Acknowledge writes without storing them.
    pub drop_writes: bool,
}

impl FakeVault {
    pub fn put(&self, mount: &str, path: &str, data: &[(&str, &str)]) {
        let data = data
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect();
        self.secrets
            .lock()
            .unwrap()
            .insert(format!("{mount}/{path}"), data);
    }
}

#[async_trait]
impl SecretStore for FakeVault {
    async fn health(&self) -> Result<HealthStatus> {
        Ok(self.health.clone())
    }

    async fn list_policies(&self) -> Result<Vec<String>> {
        Ok(self.policies.clone())
    }

    async fn read_secret(&self, mount: &str, path: &str) -> Result<SecretRecord> {
        let key = format!("{mount}/{path}");
        let secrets = self.secrets.lock().unwrap();
        let data = secrets
            .get(&key)
            .cloned()
            .ok_or_else(|| VerifyError::NotFound(key.clone()))?;
        Ok(SecretRecord {
            path: path.to_string(),
            version: Some(1),
            data,
        })
    }

    async fn write_secret(
        &self,
        mount: &str,
        path: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Option<u64>> {
        if self.drop_writes {
            return Ok(Some(1));
        }
        let data = data
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.secrets
            .lock()
            .unwrap()
            .insert(format!("{mount}/{path}"), data);
        Ok(Some(1))
    }
}

// =============================================================================
// Kubernetes
// =============================================================================

#[derive(Clone, Default)]
pub struct FakeCluster {
    pub pods: BTreeMap<String, Vec<PodRecord>>,
    pub services: BTreeMap<String, Vec<ClusterService>>,
    /// `None` makes custom object listing fail.
    pub custom_objects: Option<CustomObjectListing>,
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodRecord>> {
        Ok(self.pods.get(selector).cloned().unwrap_or_default())
    }

    async fn list_services(&self, selector: &str) -> Result<Vec<ClusterService>> {
        Ok(self.services.get(selector).cloned().unwrap_or_default())
    }

    async fn list_custom_objects(
        &self,
        _resource: &CustomResourceRef,
    ) -> Result<CustomObjectListing> {
        self.custom_objects.clone().ok_or_else(|| VerifyError::Api {
            status: 403,
            message: "servicemonitors is forbidden".to_string(),
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Integration config rendered with every feature enabled.
pub const FULL_INTEGRATION_CONFIG: &str = r#"
plugin "kubernetes" {
  config {
    host = "https://control:6443"
    service_account_token = "/etc/kubernetes/nomad-integration/nomad-token"
    ca_file = "/etc/kubernetes/nomad-integration/k8s-ca.crt"
    custom_resources = true
    custom_resource_groups = ["monitoring.coreos.com", "cert-manager.io"]
  }
}

policy {
  enabled = true
  opa_url = "http://localhost:8181"
  evaluation_paths = ["kubernetes/admission"]
}

service_mesh {
  enabled = true
  connect_sidecar_image = "envoyproxy/envoy:v1.27"
  metrics_enabled = true
}

autoscaling {
  enabled = true
  min_replicas = 1
  max_replicas = 5
}

disaster_recovery {
  enabled = true
  recovery_threshold = 3
  snapshot_path = "/var/lib/nomad/snapshots"
  snapshot_interval = "1h"
}
"#;

pub fn example_job() -> JobDescriptor {
    serde_json::from_value(json!({
        "ID": JOB_ID,
        "Status": "running",
        "TaskGroups": [{
            "Name": "kubernetes-nginx",
            "Networks": [{
                "DynamicPorts": [{"Label": "http", "Value": 28080, "To": 80}],
                "ReservedPorts": [{"Label": "metrics", "Value": 9090}]
            }],
            "Services": [
                {"Name": "mantl-example-service", "PortLabel": "http", "Tags": ["mantl-service=true"]},
                {"Name": "mantl-example-metrics", "PortLabel": "metrics", "Tags": null}
            ],
            "Tasks": [
                {
                    "Name": "nginx",
                    "Driver": "kubernetes",
                    "Config": {
                        "image": "nginx:latest",
                        "custom_resources": [{"apiVersion": "monitoring.coreos.com/v1", "kind": "ServiceMonitor"}],
                        "pod_spec": "resources:\n  limits:\n    nvidia.com/gpu: 1\n"
                    },
                    "Resources": {
                        "CPU": 500,
                        "MemoryMB": 256,
                        "Devices": [{"Name": "nvidia/gpu", "Count": 1}]
                    },
                    "Templates": null
                },
                {
                    "Name": "logging-sidecar",
                    "Driver": "kubernetes",
                    "Config": {"image": "fluent/fluentd:v1.16"}
                },
                {
                    "Name": "policy-agent",
                    "Driver": "kubernetes",
                    "Config": {"image": "openpolicyagent/opa:latest"},
                    "Templates": [{
                        "EmbeddedTmpl": "package kubernetes.admission\n\ndeny[msg] { false }\n",
                        "DestPath": "local/policies/kubernetes.rego"
                    }]
                }
            ]
        }],
        "Scaling": {"Min": 1, "Max": 5},
        "Multiregion": {
            "Strategy": {"MaxParallel": 1},
            "Regions": [{"Name": "global", "Count": 1}]
        },
        "DisasterRecovery": {"MaxDisconnect": "30s", "AutoRevert": true}
    }))
    .unwrap()
}

pub fn running_allocation() -> Allocation {
    serde_json::from_value(json!({
        "ID": ALLOC_ID,
        "JobID": JOB_ID,
        "ClientStatus": "running",
        "TaskStates": {
            "nginx": {"State": "running", "Failed": false},
            "logging-sidecar": {"State": "running", "Failed": false},
            "policy-agent": {"State": "running", "Failed": false}
        }
    }))
    .unwrap()
}

pub fn example_pod() -> PodRecord {
    let strings = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    };

    PodRecord {
        name: "mantl-example-7d9f".to_string(),
        namespace: "default".to_string(),
        labels: strings(&[
            ("app", "mantl-example"),
            ("managed-by", "nomad"),
            ("mantl-service", "true"),
        ]),
        annotations: strings(&[
            ("prometheus.io/scrape", "true"),
            ("prometheus.io/port", "9090"),
        ]),
        containers: vec![ContainerRecord {
            name: "nginx".to_string(),
            ports: vec![("http".to_string(), 80), ("metrics".to_string(), 9090)],
            limits: strings(&[
                ("cpu", "500m"),
                ("memory", "256Mi"),
                ("nvidia.com/gpu", "1"),
            ]),
            security: Some(SecurityRecord {
                run_as_non_root: Some(true),
                allow_privilege_escalation: Some(false),
            }),
        }],
    }
}

fn index_page() -> String {
    let items: String = FEATURES
        .iter()
        .map(|feature| format!("      <li>{feature}</li>\n"))
        .collect();
    format!("<html>\n  <body>\n    <h1>Mantl Kubernetes Example</h1>\n    <ul>\n{items}    </ul>\n  </body>\n</html>\n")
}

/// A federation where every check passes.
pub struct Federation {
    pub nomad: FakeNomad,
    pub consul: FakeConsul,
    pub vault: FakeVault,
    pub cluster: FakeCluster,
    pub config: VerifierConfig,
    pub dir: TempDir,
}

impl Federation {
    pub fn healthy() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let integration_config = dir.path().join("kubernetes-integration.hcl");
        std::fs::write(&integration_config, FULL_INTEGRATION_CONFIG).unwrap();
        let snapshot_dir = dir.path().join("snapshots");
        std::fs::create_dir(&snapshot_dir).unwrap();

        let mut config = VerifierConfig::for_control_node("127.0.0.1");
        config.paths.integration_config = integration_config;
        config.paths.snapshot_dir = snapshot_dir;

        let nomad = FakeNomad {
            job: example_job(),
            allocations: vec![running_allocation()],
            agent: serde_json::from_value(json!({
                "config": {
                    "Region": "global",
                    "Server": {"Enabled": true, "EnableMultiRegion": true, "HeartbeatGrace": "10s"},
                    "Plugins": {"kubernetes": {"config": {"enabled": true}}}
                }
            }))
            .unwrap(),
            metrics: serde_json::from_value(json!({
                "Timestamp": "2026-10-18 09:00:00 +0000 UTC",
                "Gauges": [
                    {"Name": "nomad.client.allocated.cpu", "Value": 500.0},
                    {"Name": "nomad.runtime.num_goroutines", "Value": 212.0}
                ],
                "Counters": null,
                "Samples": []
            }))
            .unwrap(),
            prometheus: "# HELP nomad_client_allocated_cpu\nnomad_client_allocated_cpu{node=\"control\"} 500\nnomad_client_allocated_memory{node=\"control\"} 256\n".to_string(),
            regions: vec!["global".to_string()],
            policies: Vec::new(),
            snapshot_fails: false,
            files: BTreeMap::from([
                (
                    "secrets/credentials.env".to_string(),
                    "EXAMPLE_API_KEY=test-api-key\nEXAMPLE_DB_PASSWORD=test-db-password\n"
                        .to_string(),
                ),
                ("local/fluentd.conf".to_string(), "<source>\n  @type tail\n</source>\n".to_string()),
                (
                    "local/policies/kubernetes.rego".to_string(),
                    "package kubernetes.admission\n".to_string(),
                ),
                ("local/index.html".to_string(), index_page()),
            ]),
        };

        let consul = FakeConsul {
            catalog: BTreeMap::from([
                ("consul".to_string(), Vec::new()),
                (
                    "mantl-example-service".to_string(),
                    vec!["mantl-service=true".to_string(), "http".to_string()],
                ),
                ("mantl-example-metrics".to_string(), vec!["metrics".to_string()]),
            ]),
            records: BTreeMap::from([(
                "mantl-example-service".to_string(),
                vec![ServiceRecord {
                    service_name: "mantl-example-service".to_string(),
                    address: "127.0.0.1".to_string(),
                    service_address: String::new(),
                    service_port: 1,
                    service_tags: vec!["mantl-service=true".to_string(), "http".to_string()],
                    service_meta: BTreeMap::from([
                        ("version".to_string(), "latest".to_string()),
                        ("service_type".to_string(), "web".to_string()),
                    ]),
                }],
            )]),
        };

        let vault = FakeVault {
            health: HealthStatus {
                initialized: true,
                sealed: false,
                standby: false,
                version: Some("1.15.2".to_string()),
            },
            policies: vec![
                "default".to_string(),
                "nomad-server".to_string(),
                "root".to_string(),
            ],
            secrets: Arc::default(),
            drop_writes: false,
        };
        vault.put(
            "kv",
            "mantl/kubernetes-example",
            &[("api_key", "test-api-key"), ("db_password", "test-db-password")],
        );

        let service = ClusterService {
            name: "mantl-example".to_string(),
            namespace: "default".to_string(),
            labels: BTreeMap::from([
                ("app".to_string(), "mantl-example".to_string()),
                ("mantl-service".to_string(), "true".to_string()),
            ]),
        };
        let cluster = FakeCluster {
            pods: BTreeMap::from([
                ("app=mantl-example".to_string(), vec![example_pod()]),
                ("managed-by=nomad".to_string(), vec![example_pod()]),
            ]),
            services: BTreeMap::from([
                ("app=mantl-example".to_string(), vec![service.clone()]),
                ("mantl-service=true".to_string(), vec![service]),
            ]),
            custom_objects: Some(CustomObjectListing::Present(vec![
                "mantl-example".to_string(),
            ])),
        };

        Self {
            nomad,
            consul,
            vault,
            cluster,
            config,
            dir,
        }
    }

    /// Replace the integration config on disk.
    pub fn write_integration_config(&self, content: &str) {
        std::fs::write(&self.config.paths.integration_config, content).unwrap();
    }

    pub fn missing_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Check context over clones of the current fakes.
    pub fn context(&self) -> CheckContext {
        CheckContext {
            nomad: Arc::new(self.nomad.clone()),
            consul: Arc::new(self.consul.clone()),
            vault: Arc::new(self.vault.clone()),
            cluster: Arc::new(self.cluster.clone()),
            http: reqwest::Client::new(),
            config: self.config.clone(),
        }
    }
}
