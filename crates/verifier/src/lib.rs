//! Readiness and federation checks for the Kubernetes + Nomad integration.
//!
//! A Mantl control node runs Nomad, Consul and Vault next to a Kubernetes API
//! server, with Nomad scheduling workloads onto Kubernetes through its
//! `kubernetes` driver. This crate verifies that federation from the outside:
//!
//! - **Readiness** - poll Nomad until the example job and one of its
//!   allocations are running, within a deadline
//! - **Live checks** - query all four control planes and assert the example
//!   workload is wired through each of them (service discovery, secrets,
//!   metrics, policy, regions, custom resources, mesh, scaling, GPU, recovery)
//! - **Host checks** - inspect the node's filesystem for the directories,
//!   files and rendered templates the provisioning roles lay down
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mantl_verify::{NomadClient, ReadinessVerifier, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = VerifierConfig::for_control_node("control");
//!     let nomad = NomadClient::new(config.nomad_addr(), config.request_timeout())?;
//!
//!     let ready = ReadinessVerifier::default()
//!         .wait_for_job(&nomad, &config.expectations.job_id)
//!         .await?;
//!     println!("ready: {ready}");
//!     Ok(())
//! }
//! ```

pub mod checks;
pub mod config;
pub mod consul;
pub mod error;
pub mod host;
pub mod kubernetes;
pub mod nomad;
pub mod readiness;
pub mod suite;
pub mod vault;

pub use checks::{CheckContext, CheckId, CheckOutcome};
pub use config::{Expectations, FeatureFlags, HostProfile, IntegrationPaths, VerifierConfig};
pub use consul::{ConsulClient, ServiceRegistry};
pub use error::{Result, VerifyError};
pub use kubernetes::{ClusterApi, KubeCluster};
pub use nomad::{JobStatusSource, NomadApi, NomadClient};
pub use readiness::ReadinessVerifier;
pub use suite::{CheckResult, CheckStatus, SuiteReport};
pub use vault::{SecretStore, VaultClient};
