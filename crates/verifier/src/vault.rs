//! Vault access: health, policies and KV v2 secrets.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, VerifyError};

/// Vault seal and init status (`GET /v1/sys/health`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub standby: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// A KV v2 secret at a given version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretRecord {
    pub path: String,
    pub version: Option<u64>,
    pub data: BTreeMap<String, Value>,
}

impl SecretRecord {
    /// String value of a secret field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Debug, Deserialize)]
struct KvReadData {
    #[serde(default)]
    data: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    metadata: Option<KvMetadata>,
}

#[derive(Debug, Deserialize)]
struct KvMetadata {
    #[serde(default)]
    version: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct KvWriteResponse {
    #[serde(default)]
    data: Option<KvMetadata>,
}

#[derive(Debug, Deserialize)]
struct PolicyList {
    #[serde(default)]
    policies: Vec<String>,
}

/// Secret store operations used by the checks.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Seal and init status.
    async fn health(&self) -> Result<HealthStatus>;

    /// Names of all ACL policies.
    async fn list_policies(&self) -> Result<Vec<String>>;

    /// Read the latest version of a KV v2 secret.
    async fn read_secret(&self, mount: &str, path: &str) -> Result<SecretRecord>;

    /// Create or update a KV v2 secret, returning the new version.
    async fn write_secret(
        &self,
        mount: &str,
        path: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Option<u64>>;
}

/// Vault HTTP API client.
#[derive(Clone)]
pub struct VaultClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl VaultClient {
    /// Create a client for the server at `base_url` (e.g. `http://control:8200`).
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("X-Vault-Token", token),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorized(request).send().await?;
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

    fn kv_data_path(mount: &str, path: &str) -> String {
        format!(
            "{}/data/{}",
            mount.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn health(&self) -> Result<HealthStatus> {
        let url = self.url("sys/health");
        debug!(url = %url, "GET request");

        // Standby, sealed and uninitialized nodes answer with non-2xx codes
        // but still return the status document.
        let response = self.authorized(self.client.get(&url)).send().await?;
        let status = response.status();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|_| VerifyError::Api {
            status: status.as_u16(),
            message: text,
        })
    }

    async fn list_policies(&self) -> Result<Vec<String>> {
        let url = self.url("sys/policy");
        debug!(url = %url, "GET request");
        let list: PolicyList = self.send(self.client.get(&url)).await?;
        Ok(list.policies)
    }

    async fn read_secret(&self, mount: &str, path: &str) -> Result<SecretRecord> {
        let url = self.url(&Self::kv_data_path(mount, path));
        debug!(url = %url, "Reading secret");

        let response: KvReadResponse = self.send(self.client.get(&url)).await?;
        Ok(SecretRecord {
            path: path.to_string(),
            version: response.data.metadata.and_then(|m| m.version),
            data: response.data.data.unwrap_or_default(),
        })
    }

    async fn write_secret(
        &self,
        mount: &str,
        path: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Option<u64>> {
        let url = self.url(&Self::kv_data_path(mount, path));
        info!(mount = %mount, path = %path, "Writing secret");

        let body = serde_json::json!({ "data": data });
        let response: KvWriteResponse = self.send(self.client.post(&url).json(&body)).await?;
        Ok(response.data.and_then(|m| m.version))
    }
}
