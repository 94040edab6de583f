//! Verifier configuration.
//!
//! Every address, path and expected value the checks use lives here and is
//! passed into the clients and checks at construction time. Values come from
//! (lowest to highest precedence) built-in defaults, an optional JSON config
//! file, the environment (`CONTROL_NODE`, `VAULT_TOKEN`) and CLI flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VerifyError};

/// Default control node host name.
pub const DEFAULT_CONTROL_NODE: &str = "control";

/// Nomad HTTP API port on the control node.
pub const NOMAD_PORT: u16 = 4646;

/// Consul HTTP API port on the control node.
pub const CONSUL_PORT: u16 = 8500;

/// Vault HTTP API port on the control node.
pub const VAULT_PORT: u16 = 8200;

/// Kubernetes API server port on the control node.
pub const KUBERNETES_PORT: u16 = 6443;

/// Marker preceding the root token in the Vault init transcript.
const ROOT_TOKEN_MARKER: &str = "Initial Root Token";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Host name of the control node all endpoints are derived from.
    pub control_node: String,
    /// Explicit endpoint overrides.
    pub endpoints: EndpointOverrides,
    /// Vault token. Resolved from files when unset.
    pub vault_token: Option<String>,
    /// File holding a Vault token for tests.
    pub vault_token_file: PathBuf,
    /// Vault init transcript holding the root token.
    pub vault_init_file: PathBuf,
    /// Shared kubeconfig written by the provisioning system.
    pub kubeconfig: PathBuf,
    /// Per-request timeout for HTTP clients in seconds.
    pub request_timeout_secs: u64,
    /// Job readiness polling.
    pub readiness: ReadinessSettings,
    /// Paths of files placed on disk by the provisioning system.
    pub paths: IntegrationPaths,
    /// Expected values asserted by the live checks.
    pub expectations: Expectations,
    /// Host layout check settings.
    pub host: HostProfile,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            control_node: DEFAULT_CONTROL_NODE.to_string(),
            endpoints: EndpointOverrides::default(),
            vault_token: None,
            vault_token_file: PathBuf::from("/etc/mantl/test/vault-token.txt"),
            vault_init_file: PathBuf::from("/var/lib/vault/init.txt"),
            kubeconfig: PathBuf::from("/etc/mantl/config/kubeconfig"),
            request_timeout_secs: 30,
            readiness: ReadinessSettings::default(),
            paths: IntegrationPaths::default(),
            expectations: Expectations::default(),
            host: HostProfile::default(),
        }
    }
}

impl VerifierConfig {
    /// Configuration for the given control node with all other defaults.
    #[must_use]
    pub fn for_control_node(control_node: impl Into<String>) -> Self {
        Self {
            control_node: control_node.into(),
            ..Self::default()
        }
    }

    /// Load configuration from an optional JSON file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| VerifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| VerifyError::Config(format!("{}: {e}", path.display())))?;
        config.validate().map_err(|e| match e {
            VerifyError::Config(msg) => VerifyError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        debug!(path = %path.display(), "Loaded verifier config");
        Ok(config)
    }

    /// Reject settings no client can run with.
    ///
    /// # Errors
    /// Returns a configuration error for a zero request timeout.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(VerifyError::Config(
                "request timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `CONTROL_NODE` and `VAULT_TOKEN` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node) = lookup("CONTROL_NODE").filter(|v| !v.is_empty()) {
            self.control_node = node;
        }
        if let Some(token) = lookup("VAULT_TOKEN").filter(|v| !v.is_empty()) {
            self.vault_token = Some(token);
        }
    }

    /// Nomad API base URL.
    #[must_use]
    pub fn nomad_addr(&self) -> String {
        self.endpoints
            .nomad
            .clone()
            .unwrap_or_else(|| format!("http://{}:{NOMAD_PORT}", self.control_node))
    }

    /// Consul API base URL.
    #[must_use]
    pub fn consul_addr(&self) -> String {
        self.endpoints
            .consul
            .clone()
            .unwrap_or_else(|| format!("http://{}:{CONSUL_PORT}", self.control_node))
    }

    /// Vault API base URL.
    #[must_use]
    pub fn vault_addr(&self) -> String {
        self.endpoints
            .vault
            .clone()
            .unwrap_or_else(|| format!("http://{}:{VAULT_PORT}", self.control_node))
    }

    /// Kubernetes API server URL, used when no kubeconfig is available.
    #[must_use]
    pub fn kubernetes_addr(&self) -> String {
        self.endpoints
            .kubernetes
            .clone()
            .unwrap_or_else(|| format!("https://{}:{KUBERNETES_PORT}", self.control_node))
    }

    /// HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the Vault token: explicit value, then the token file, then the
    /// root token line of the init transcript.
    #[must_use]
    pub fn resolve_vault_token(&self) -> Option<String> {
        if let Some(token) = self.vault_token.as_ref().filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }

        match std::fs::read_to_string(&self.vault_token_file) {
            Ok(content) if !content.trim().is_empty() => {
                return Some(content.trim().to_string());
            }
            Ok(_) => {}
            Err(e) => {
                debug!(
                    path = %self.vault_token_file.display(),
                    error = %e,
                    "Vault token file not readable"
                );
            }
        }

        match std::fs::read_to_string(&self.vault_init_file) {
            Ok(content) => root_token_from_init(&content),
            Err(e) => {
                warn!(
                    path = %self.vault_init_file.display(),
                    error = %e,
                    "No Vault token available, continuing unauthenticated"
                );
                None
            }
        }
    }
}

/// Extract the root token from a `vault operator init` transcript.
#[must_use]
pub fn root_token_from_init(content: &str) -> Option<String> {
    content
        .lines()
        .filter(|line| line.contains(ROOT_TOKEN_MARKER))
        .find_map(|line| line.split(": ").nth(1))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Explicit endpoint URLs overriding the control-node defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
    pub nomad: Option<String>,
    pub consul: Option<String>,
    pub vault: Option<String>,
    pub kubernetes: Option<String>,
}

/// Job readiness polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Give up after this many seconds.
    pub timeout_secs: u64,
    /// Seconds between polls.
    pub interval_secs: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            interval_secs: 2,
        }
    }
}

impl ReadinessSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Files and directories the provisioning system places on the control node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationPaths {
    /// Nomad Kubernetes integration config (HCL).
    pub integration_config: PathBuf,
    /// Generated example job spec.
    pub example_job: PathBuf,
    /// Nomad snapshot directory.
    pub snapshot_dir: PathBuf,
}

impl Default for IntegrationPaths {
    fn default() -> Self {
        Self {
            integration_config: PathBuf::from("/etc/nomad.d/kubernetes-integration.hcl"),
            example_job: PathBuf::from(
                "/var/lib/kubernetes/nomad-integration/kubernetes-example.nomad",
            ),
            snapshot_dir: PathBuf::from("/var/lib/nomad/snapshots"),
        }
    }
}

/// Values the live checks expect to find in the federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectations {
    pub job_id: String,
    pub primary_task: String,
    pub logging_task: String,
    pub policy_task: String,
    pub service_name: String,
    pub metrics_service_name: String,
    pub service_tag: String,
    pub service_meta: BTreeMap<String, String>,
    /// Selector matching the example app's pods and services.
    pub app_selector: String,
    /// Value of the `app` label on the example pods.
    pub app_label: String,
    /// Selector matching pods created by Nomad.
    pub managed_selector: String,
    /// Selector matching services exported for discovery.
    pub discovery_selector: String,
    pub region: String,
    pub kv_mount: String,
    pub secret_path: String,
    pub secret_values: BTreeMap<String, String>,
    pub nomad_policy: String,
    pub write_probe_path: String,
    pub write_probe_key: String,
    pub write_probe_value: String,
    pub opa_image_prefix: String,
    pub gpu_device: String,
    pub gpu_resource: String,
    pub gpu_limit: String,
    pub metrics_port_name: String,
    pub metrics_port: i32,
    /// Feature names the example page must mention.
    pub features: Vec<String>,
}

impl Default for Expectations {
    fn default() -> Self {
        let service_meta = [("version", "latest"), ("service_type", "web")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let secret_values = [
            ("api_key", "test-api-key"),
            ("db_password", "test-db-password"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            job_id: "mantl-kubernetes-example".to_string(),
            primary_task: "nginx".to_string(),
            logging_task: "logging-sidecar".to_string(),
            policy_task: "policy-agent".to_string(),
            service_name: "mantl-example-service".to_string(),
            metrics_service_name: "mantl-example-metrics".to_string(),
            service_tag: "mantl-service=true".to_string(),
            service_meta,
            app_selector: "app=mantl-example".to_string(),
            app_label: "mantl-example".to_string(),
            managed_selector: "managed-by=nomad".to_string(),
            discovery_selector: "mantl-service=true".to_string(),
            region: "global".to_string(),
            kv_mount: "kv".to_string(),
            secret_path: "mantl/kubernetes-example".to_string(),
            secret_values,
            nomad_policy: "nomad-server".to_string(),
            write_probe_path: "mantl/nomad-test".to_string(),
            write_probe_key: "test-key".to_string(),
            write_probe_value: "test-value".to_string(),
            opa_image_prefix: "openpolicyagent/opa".to_string(),
            gpu_device: "nvidia/gpu".to_string(),
            gpu_resource: "nvidia.com/gpu".to_string(),
            gpu_limit: "1".to_string(),
            metrics_port_name: "metrics".to_string(),
            metrics_port: 9090,
            features: FEATURES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Expectations {
    /// Tasks that must be running in the example allocation.
    #[must_use]
    pub fn required_tasks(&self) -> [&str; 3] {
        [&self.primary_task, &self.logging_task, &self.policy_task]
    }
}

/// Federated features advertised by the example job.
pub const FEATURES: [&str; 10] = [
    "Cross-platform Service Discovery",
    "Shared Vault Secrets Management",
    "Federated Metrics and Logging",
    "Multi-region Orchestration",
    "GPU Workload Scheduling",
    "Autoscaling Integration",
    "Custom Resource Definition Support",
    "Disaster Recovery with Automatic Failover",
    "Zero-downtime Migration Tools",
    "Unified Policy Enforcement with OPA",
];

/// What the host layout checks should expect on this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    /// Prefix prepended to every absolute host path.
    pub root: PathBuf,
    /// Whether this host is a control node.
    pub control_node: bool,
    /// Enabled integration features.
    pub features: FeatureFlags,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            control_node: true,
            features: FeatureFlags::default(),
        }
    }
}

/// Integration features toggled by the provisioning variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct FeatureFlags {
    pub common_criteria: bool,
    pub service_discovery: bool,
    pub vault: bool,
    pub metrics: bool,
    pub multi_region: bool,
    pub gpu: bool,
    pub autoscaling: bool,
    pub crd: bool,
    pub disaster_recovery: bool,
    pub opa: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            common_criteria: false,
            service_discovery: true,
            vault: false,
            metrics: false,
            multi_region: false,
            gpu: false,
            autoscaling: false,
            crd: false,
            disaster_recovery: false,
            opa: false,
        }
    }
}

impl FeatureFlags {
    /// Every feature switched on.
    #[must_use]
    pub fn all() -> Self {
        Self {
            common_criteria: true,
            service_discovery: true,
            vault: true,
            metrics: true,
            multi_region: true,
            gpu: true,
            autoscaling: true,
            crd: true,
            disaster_recovery: true,
            opa: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_endpoints_derive_from_control_node() {
        let config = VerifierConfig::for_control_node("ctl-01");
        assert_eq!(config.nomad_addr(), "http://ctl-01:4646");
        assert_eq!(config.consul_addr(), "http://ctl-01:8500");
        assert_eq!(config.vault_addr(), "http://ctl-01:8200");
        assert_eq!(config.kubernetes_addr(), "https://ctl-01:6443");
    }

    #[test]
    fn test_endpoint_override_wins() {
        let mut config = VerifierConfig::default();
        config.endpoints.nomad = Some("http://127.0.0.1:14646".to_string());
        assert_eq!(config.nomad_addr(), "http://127.0.0.1:14646");
        assert_eq!(config.consul_addr(), "http://control:8500");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([("CONTROL_NODE", "node-a"), ("VAULT_TOKEN", "s.abc")]);
        let mut config = VerifierConfig::default();
        config.apply_env_from(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.control_node, "node-a");
        assert_eq!(config.vault_token.as_deref(), Some("s.abc"));
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let mut config = VerifierConfig::default();
        config.apply_env_from(|_| Some(String::new()));
        assert_eq!(config.control_node, DEFAULT_CONTROL_NODE);
        assert!(config.vault_token.is_none());
    }

    #[test]
    fn test_partial_json_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"control_node": "ctl-02", "readiness": {{"timeout_secs": 10}}, "expectations": {{"region": "us-east"}}}}"#
        )
        .unwrap();

        let config = VerifierConfig::from_file(file.path()).unwrap();
        assert_eq!(config.control_node, "ctl-02");
        assert_eq!(config.readiness.timeout_secs, 10);
        assert_eq!(config.readiness.interval_secs, 2);
        assert_eq!(config.expectations.region, "us-east");
        assert_eq!(config.expectations.job_id, "mantl-kubernetes-example");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = VerifierConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }

    #[test]
    fn test_zero_request_timeout_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"request_timeout_secs": 0}}"#).unwrap();

        let err = VerifierConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
        assert!(err.to_string().contains("request timeout must be positive"));
        assert!(VerifierConfig::load(Some(file.path())).is_err());

        let config = VerifierConfig {
            request_timeout_secs: 0,
            ..VerifierConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(VerifierConfig::default().validate().is_ok());
    }

    #[test]
    fn test_vault_token_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("vault-token.txt");
        let init_file = dir.path().join("init.txt");
        std::fs::write(
            &init_file,
            "Unseal Key 1: abc\nInitial Root Token: s.root\n",
        )
        .unwrap();

        let mut config = VerifierConfig {
            vault_token_file: token_file.clone(),
            vault_init_file: init_file,
            ..VerifierConfig::default()
        };
        assert_eq!(config.resolve_vault_token().as_deref(), Some("s.root"));

        std::fs::write(&token_file, "s.file\n").unwrap();
        assert_eq!(config.resolve_vault_token().as_deref(), Some("s.file"));

        config.vault_token = Some("s.explicit".to_string());
        assert_eq!(config.resolve_vault_token().as_deref(), Some("s.explicit"));
    }

    #[test]
    fn test_root_token_missing() {
        assert_eq!(root_token_from_init("Unseal Key 1: abc\n"), None);
    }

    #[test]
    fn test_required_tasks() {
        let expectations = Expectations::default();
        assert_eq!(
            expectations.required_tasks(),
            ["nginx", "logging-sidecar", "policy-agent"]
        );
    }
}
