//! Kubernetes API access.
//!
//! Pods and services are flattened into [`PodRecord`] and [`ClusterService`]
//! so the checks never touch `k8s-openapi` option chains directly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, Service};
use kube::api::{Api, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::{debug, info, warn};

use crate::config::VerifierConfig;
use crate::error::{Result, VerifyError};

/// A custom resource type addressed by group, version and plural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomResourceRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl CustomResourceRef {
    /// Prometheus operator `ServiceMonitor`.
    #[must_use]
    pub fn service_monitors() -> Self {
        Self {
            group: "monitoring.coreos.com".to_string(),
            version: "v1".to_string(),
            kind: "ServiceMonitor".to_string(),
            plural: "servicemonitors".to_string(),
        }
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: format!("{}/{}", self.group, self.version),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// Result of listing a custom resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomObjectListing {
    /// The API group is not served by the cluster.
    Absent,
    /// Names of the objects found.
    Present(Vec<String>),
}

/// Summary of a pod.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<ContainerRecord>,
}

impl PodRecord {
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl From<&Pod> for PodRecord {
    fn from(pod: &Pod) -> Self {
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            labels: pod.metadata.labels.clone().unwrap_or_default(),
            annotations: pod.metadata.annotations.clone().unwrap_or_default(),
            containers: pod
                .spec
                .as_ref()
                .map(|spec| spec.containers.iter().map(ContainerRecord::from).collect())
                .unwrap_or_default(),
        }
    }
}

/// Summary of a container within a pod.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerRecord {
    pub name: String,
    /// Named container ports as `(name, port)`.
    pub ports: Vec<(String, i32)>,
    /// Resource limits rendered as quantity strings.
    pub limits: BTreeMap<String, String>,
    pub security: Option<SecurityRecord>,
}

impl ContainerRecord {
    #[must_use]
    pub fn limit(&self, resource: &str) -> Option<&str> {
        self.limits.get(resource).map(String::as_str)
    }

    #[must_use]
    pub fn exposes(&self, port_name: &str, port: i32) -> bool {
        self.ports
            .iter()
            .any(|(name, number)| name == port_name && *number == port)
    }
}

impl From<&Container> for ContainerRecord {
    fn from(container: &Container) -> Self {
        Self {
            name: container.name.clone(),
            ports: container
                .ports
                .iter()
                .flatten()
                .map(|port| (port.name.clone().unwrap_or_default(), port.container_port))
                .collect(),
            limits: container
                .resources
                .as_ref()
                .and_then(|resources| resources.limits.as_ref())
                .map(|limits| {
                    limits
                        .iter()
                        .map(|(name, quantity)| (name.clone(), quantity.0.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            security: container
                .security_context
                .as_ref()
                .map(|context| SecurityRecord {
                    run_as_non_root: context.run_as_non_root,
                    allow_privilege_escalation: context.allow_privilege_escalation,
                }),
        }
    }
}

/// The container security settings the policy layer enforces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityRecord {
    pub run_as_non_root: Option<bool>,
    pub allow_privilege_escalation: Option<bool>,
}

/// Summary of a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterService {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl From<&Service> for ClusterService {
    fn from(service: &Service) -> Self {
        Self {
            name: service.metadata.name.clone().unwrap_or_default(),
            namespace: service.metadata.namespace.clone().unwrap_or_default(),
            labels: service.metadata.labels.clone().unwrap_or_default(),
        }
    }
}

/// Cluster-wide read access used by the checks.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Pods in all namespaces matching a label selector.
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodRecord>>;

    /// Services in all namespaces matching a label selector.
    async fn list_services(&self, selector: &str) -> Result<Vec<ClusterService>>;

    /// Cluster-wide objects of a custom resource type.
    async fn list_custom_objects(&self, resource: &CustomResourceRef)
        -> Result<CustomObjectListing>;
}

/// [`ClusterApi`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the shared kubeconfig, then the inferred local or
    /// in-cluster config, then the control node's API server address.
    pub async fn connect(config: &VerifierConfig) -> Result<Self> {
        let kube_config = match Self::load_config(config).await {
            Ok(kube_config) => kube_config,
            Err(e) => {
                warn!(error = %e, "No kubeconfig available, falling back to control node address");
                let uri: http::Uri = config.kubernetes_addr().parse().map_err(|e| {
                    VerifyError::KubeConfig(format!(
                        "invalid API server address {}: {e}",
                        config.kubernetes_addr()
                    ))
                })?;
                Config::new(uri)
            }
        };

        info!(cluster_url = %kube_config.cluster_url, "Connecting to Kubernetes");
        let client = Client::try_from(kube_config)?;
        Ok(Self { client })
    }

    async fn load_config(config: &VerifierConfig) -> Result<Config> {
        if config.kubeconfig.exists() {
            debug!(path = %config.kubeconfig.display(), "Loading shared kubeconfig");
            let kubeconfig = Kubeconfig::read_from(&config.kubeconfig).map_err(|e| {
                VerifyError::KubeConfig(format!(
                    "failed to read {}: {e}",
                    config.kubeconfig.display()
                ))
            })?;
            return Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| VerifyError::KubeConfig(e.to_string()));
        }

        Config::infer()
            .await
            .map_err(|e| VerifyError::KubeConfig(e.to_string()))
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodRecord>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        debug!(selector = %selector, count = list.items.len(), "Listed pods");
        Ok(list.items.iter().map(PodRecord::from).collect())
    }

    async fn list_services(&self, selector: &str) -> Result<Vec<ClusterService>> {
        let services: Api<Service> = Api::all(self.client.clone());
        let list = services
            .list(&ListParams::default().labels(selector))
            .await?;
        debug!(selector = %selector, count = list.items.len(), "Listed services");
        Ok(list.items.iter().map(ClusterService::from).collect())
    }

    async fn list_custom_objects(
        &self,
        resource: &CustomResourceRef,
    ) -> Result<CustomObjectListing> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource.api_resource());

        match api.list(&ListParams::default()).await {
            Ok(list) => Ok(CustomObjectListing::Present(
                list.items
                    .into_iter()
                    .filter_map(|object| object.metadata.name)
                    .collect(),
            )),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(
                    group = %resource.group,
                    plural = %resource.plural,
                    "Custom resource API not served"
                );
                Ok(CustomObjectListing::Absent)
            }
            Err(e) => Err(e.into()),
        }
    }
}
