//! Host layout checks.
//!
//! These run against the local filesystem of a provisioned node and confirm
//! the directories, integration files and rendered templates the provisioning
//! roles lay down. Every check is plain data: a list of paths with the kind of
//! entry expected and the substrings a file must contain. Paths are resolved
//! under [`HostProfile::root`] so a node image can be inspected from outside.
//! The integration config and example job are located through
//! [`IntegrationPaths`], the same settings the live checks read them from.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::checks::{read_file, CheckOutcome};
use crate::config::{FeatureFlags, HostProfile, IntegrationPaths};
use crate::error::{require, Result};

const INTEGRATION_CONFIG: HostPath = HostPath::IntegrationConfig;
const EXAMPLE_JOB: HostPath = HostPath::ExampleJob;

/// Where an expectation looks on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPath {
    /// A path laid down at a fixed location.
    Fixed(&'static str),
    /// [`IntegrationPaths::integration_config`].
    IntegrationConfig,
    /// [`IntegrationPaths::example_job`].
    ExampleJob,
}

impl HostPath {
    /// Absolute host path, before the root prefix is applied.
    #[must_use]
    pub fn resolve(self, paths: &IntegrationPaths) -> String {
        match self {
            Self::Fixed(path) => path.to_string(),
            Self::IntegrationConfig => paths.integration_config.to_string_lossy().into_owned(),
            Self::ExampleJob => paths.example_job.to_string_lossy().into_owned(),
        }
    }
}

/// Kind of filesystem entry expected at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One path expectation.
#[derive(Debug, Clone, Copy)]
pub struct PathExpectation {
    pub path: HostPath,
    pub kind: EntryKind,
    /// Substrings the file must contain.
    pub contains: &'static [&'static str],
}

const fn dir(path: &'static str) -> PathExpectation {
    PathExpectation {
        path: HostPath::Fixed(path),
        kind: EntryKind::Directory,
        contains: &[],
    }
}

const fn file(path: &'static str) -> PathExpectation {
    rendered(HostPath::Fixed(path))
}

const fn rendered(path: HostPath) -> PathExpectation {
    PathExpectation {
        path,
        kind: EntryKind::File,
        contains: &[],
    }
}

const fn file_containing(
    path: HostPath,
    contains: &'static [&'static str],
) -> PathExpectation {
    PathExpectation {
        path,
        kind: EntryKind::File,
        contains,
    }
}

/// Integration feature a host check is gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    CommonCriteria,
    ServiceDiscovery,
    Vault,
    Metrics,
    MultiRegion,
    Gpu,
    Autoscaling,
    Crd,
    DisasterRecovery,
    Opa,
}

impl Feature {
    #[must_use]
    pub fn enabled(self, flags: &FeatureFlags) -> bool {
        match self {
            Self::CommonCriteria => flags.common_criteria,
            Self::ServiceDiscovery => flags.service_discovery,
            Self::Vault => flags.vault,
            Self::Metrics => flags.metrics,
            Self::MultiRegion => flags.multi_region,
            Self::Gpu => flags.gpu,
            Self::Autoscaling => flags.autoscaling,
            Self::Crd => flags.crd,
            Self::DisasterRecovery => flags.disaster_recovery,
            Self::Opa => flags.opa,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::CommonCriteria => "Common Criteria",
            Self::ServiceDiscovery => "Service discovery",
            Self::Vault => "Vault integration",
            Self::Metrics => "Metrics",
            Self::MultiRegion => "Multi-region",
            Self::Gpu => "GPU scheduling",
            Self::Autoscaling => "Autoscaling",
            Self::Crd => "CRD support",
            Self::DisasterRecovery => "Disaster recovery",
            Self::Opa => "OPA policy enforcement",
        }
    }
}

/// Which hosts a check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    AllHosts,
    ControlNode,
    /// Control nodes with the feature switched on.
    Feature(Feature),
}

/// A named group of path expectations.
#[derive(Debug, Clone, Copy)]
pub struct HostCheck {
    pub name: &'static str,
    pub scope: Scope,
    pub expectations: &'static [PathExpectation],
}

/// Every host check in execution order.
pub const HOST_CHECKS: &[HostCheck] = &[
    HostCheck {
        name: "kubernetes-directories",
        scope: Scope::AllHosts,
        expectations: &[
            dir("/etc/kubernetes"),
            dir("/var/lib/kubernetes"),
            dir("/var/log/kubernetes"),
        ],
    },
    HostCheck {
        name: "integration-directories",
        scope: Scope::AllHosts,
        expectations: &[
            dir("/etc/kubernetes/nomad-integration"),
            dir("/var/lib/kubernetes/nomad-integration"),
        ],
    },
    HostCheck {
        name: "integration-files",
        scope: Scope::ControlNode,
        expectations: &[
            file("/etc/kubernetes/nomad-integration/k8s-api-server"),
            file("/etc/kubernetes/nomad-integration/k8s-ca.crt"),
            file("/etc/kubernetes/nomad-integration/nomad-token"),
            rendered(INTEGRATION_CONFIG),
            rendered(EXAMPLE_JOB),
        ],
    },
    HostCheck {
        name: "integration-config-content",
        scope: Scope::ControlNode,
        expectations: &[file_containing(
            INTEGRATION_CONFIG,
            &[
                "plugin \"kubernetes\"",
                "host =",
                "service_account_token =",
                "ca_file =",
            ],
        )],
    },
    HostCheck {
        name: "example-job-content",
        scope: Scope::ControlNode,
        expectations: &[file_containing(
            EXAMPLE_JOB,
            &[
                "job \"mantl-kubernetes-example\"",
                "driver = \"kubernetes\"",
                "image =",
            ],
        )],
    },
    HostCheck {
        name: "rbac-files",
        scope: Scope::ControlNode,
        expectations: &[
            file("/etc/kubernetes/nomad-integration/nomad-sa.yaml"),
            file("/etc/kubernetes/nomad-integration/nomad-clusterrole.yaml"),
            file("/etc/kubernetes/nomad-integration/nomad-clusterrolebinding.yaml"),
        ],
    },
    HostCheck {
        name: "common-criteria",
        scope: Scope::Feature(Feature::CommonCriteria),
        expectations: &[file_containing(
            INTEGRATION_CONFIG,
            &[
                "audit {",
                "enabled = true",
                "type = \"file\"",
                "path = \"/var/log/nomad/kubernetes-audit.json\"",
            ],
        )],
    },
    HostCheck {
        name: "service-discovery",
        scope: Scope::Feature(Feature::ServiceDiscovery),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &[
                    "service_discovery \"kubernetes\"",
                    "server_address =",
                    "token =",
                    "label_selector =",
                ],
            ),
            file_containing(
                EXAMPLE_JOB,
                &["mantl-service=true", "Cross-platform Service Discovery"],
            ),
        ],
    },
    HostCheck {
        name: "vault",
        scope: Scope::Feature(Feature::Vault),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &[
                    "vault {",
                    "enabled = true",
                    "address =",
                    "token =",
                    "kubernetes_auth {",
                ],
            ),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "volumeMounts:",
                    "name: vault-token",
                    "template {",
                    "with secret",
                    "Shared Vault Secrets Management",
                ],
            ),
        ],
    },
    HostCheck {
        name: "metrics",
        scope: Scope::Feature(Feature::Metrics),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &[
                    "telemetry {",
                    "prometheus_metrics = true",
                    "publish_allocation_metrics = true",
                    "collection_interval =",
                ],
            ),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "task \"logging-sidecar\"",
                    "image = \"{{ kubernetes_nomad_fluentd_image",
                    "prometheus.yml",
                    "Federated Metrics and Logging",
                ],
            ),
        ],
    },
    HostCheck {
        name: "multi-region",
        scope: Scope::Feature(Feature::MultiRegion),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &["multi_region {", "enabled = true", "regions =", "strategy ="],
            ),
            file_containing(EXAMPLE_JOB, &["multiregion {", "Multi-region Orchestration"]),
        ],
    },
    HostCheck {
        name: "gpu",
        scope: Scope::Feature(Feature::Gpu),
        expectations: &[
            file_containing(INTEGRATION_CONFIG, &["gpu_support = true", "gpu_vendor ="]),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "device \"{{ kubernetes_nomad_gpu_vendor",
                    "GPU Workload Scheduling",
                ],
            ),
        ],
    },
    HostCheck {
        name: "autoscaling",
        scope: Scope::Feature(Feature::Autoscaling),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &[
                    "autoscaling {",
                    "enabled = true",
                    "min_replicas =",
                    "max_replicas =",
                ],
            ),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "scaling {",
                    "min     =",
                    "max     =",
                    "Autoscaling Integration",
                ],
            ),
        ],
    },
    HostCheck {
        name: "crd",
        scope: Scope::Feature(Feature::Crd),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &["custom_resources =", "custom_resource_groups ="],
            ),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "custom_resources = [",
                    "apiVersion = \"monitoring.coreos.com/v1\"",
                    "Custom Resource Definition Support",
                ],
            ),
        ],
    },
    HostCheck {
        name: "disaster-recovery",
        scope: Scope::Feature(Feature::DisasterRecovery),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &[
                    "disaster_recovery {",
                    "enabled = true",
                    "recovery_threshold =",
                    "snapshot_path =",
                ],
            ),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "disaster_recovery {",
                    "Disaster Recovery with Automatic Failover",
                ],
            ),
        ],
    },
    HostCheck {
        name: "opa",
        scope: Scope::Feature(Feature::Opa),
        expectations: &[
            file_containing(
                INTEGRATION_CONFIG,
                &["policy {", "enabled = true", "opa_url =", "evaluation_paths ="],
            ),
            file_containing(
                EXAMPLE_JOB,
                &[
                    "task \"policy-agent\"",
                    "openpolicyagent/opa",
                    "package kubernetes.admission",
                    "Unified Policy Enforcement with OPA",
                ],
            ),
        ],
    },
];

impl HostCheck {
    /// Look up a host check by name.
    #[must_use]
    pub fn find(name: &str) -> Option<&'static HostCheck> {
        HOST_CHECKS.iter().find(|check| check.name == name)
    }

    /// Why this check does not apply to the host, if it doesn't.
    #[must_use]
    pub fn skip_reason(&self, profile: &HostProfile) -> Option<String> {
        if matches!(self.scope, Scope::AllHosts) {
            return None;
        }
        if !profile.control_node {
            return Some("Not a control node".to_string());
        }
        match self.scope {
            Scope::Feature(feature) if !feature.enabled(&profile.features) => {
                Some(format!("{} not enabled", feature.label()))
            }
            _ => None,
        }
    }

    /// Run the check against the host described by `profile`, locating the
    /// integration files through `paths`.
    pub async fn run(
        &self,
        profile: &HostProfile,
        paths: &IntegrationPaths,
    ) -> Result<CheckOutcome> {
        if let Some(reason) = self.skip_reason(profile) {
            debug!(check = self.name, reason = %reason, "Skipping host check");
            return Ok(CheckOutcome::Skipped(reason));
        }

        for expectation in self.expectations {
            verify_path(&profile.root, paths, expectation).await?;
        }
        Ok(CheckOutcome::Passed)
    }
}

/// Resolve an absolute host path under `root`.
#[must_use]
pub fn host_path(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

async fn verify_path(
    root: &Path,
    paths: &IntegrationPaths,
    expectation: &PathExpectation,
) -> Result<()> {
    let shown = expectation.path.resolve(paths);
    let path = host_path(root, &shown);
    let metadata = tokio::fs::metadata(&path).await.ok();
    require(metadata.is_some(), format!("{shown} does not exist"))?;

    let is_dir = metadata.is_some_and(|meta| meta.is_dir());
    match expectation.kind {
        EntryKind::Directory => require(is_dir, format!("{shown} is not a directory"))?,
        EntryKind::File => require(!is_dir, format!("{shown} is not a file"))?,
    }

    if expectation.contains.is_empty() {
        return Ok(());
    }
    let content = read_file(&path).await?;
    for needle in expectation.contains {
        require(
            content.contains(needle),
            format!("{needle} not found in {shown}"),
        )?;
    }
    Ok(())
}
