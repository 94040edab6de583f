//! Consul catalog access.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VerifyError};

/// Service name to tag list, as returned by `GET /v1/catalog/services`.
pub type ServiceCatalog = BTreeMap<String, Vec<String>>;

/// One catalog entry for a service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRecord {
    #[serde(default)]
    pub service_name: String,
    /// Node address, used when the service registers no address of its own.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub service_address: String,
    #[serde(default)]
    pub service_port: u16,
    #[serde(default)]
    pub service_tags: Vec<String>,
    #[serde(default)]
    pub service_meta: BTreeMap<String, String>,
}

impl ServiceRecord {
    /// Address clients should dial.
    #[must_use]
    pub fn endpoint_address(&self) -> &str {
        if self.service_address.is_empty() {
            &self.address
        } else {
            &self.service_address
        }
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.service_tags.iter().any(|t| t == tag)
    }

    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.service_meta.get(key).map(String::as_str)
    }
}

/// Services with at least one tag containing `fragment`.
#[must_use]
pub fn tagged_services<'a>(catalog: &'a ServiceCatalog, fragment: &str) -> Vec<&'a str> {
    catalog
        .iter()
        .filter(|(_, tags)| tags.iter().any(|tag| tag.contains(fragment)))
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Read access to the Consul service catalog.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// All registered services with their tags.
    async fn services(&self) -> Result<ServiceCatalog>;

    /// Instances of a single service.
    async fn service(&self, name: &str) -> Result<Vec<ServiceRecord>>;
}

/// Consul HTTP API client.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    client: Client,
    base_url: String,
}

impl ConsulClient {
    /// Create a client for the agent at `base_url` (e.g. `http://control:8500`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/v1/{path}", self.base_url);
        debug!(url = %url, "GET request");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(serde_json::from_str(&text)?)
        } else if status == StatusCode::NOT_FOUND {
            Err(VerifyError::NotFound(text))
        } else {
            Err(VerifyError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

#[async_trait]
impl ServiceRegistry for ConsulClient {
    async fn services(&self) -> Result<ServiceCatalog> {
        self.get("catalog/services").await
    }

    async fn service(&self, name: &str) -> Result<Vec<ServiceRecord>> {
        self.get(&format!("catalog/service/{name}")).await
    }
}
