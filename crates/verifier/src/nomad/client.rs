//! Nomad HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{AgentInfo, Allocation, JobDescriptor, MetricsSummary, ScalingPolicy};
use super::{JobStatusSource, NomadApi};
use crate::error::{Result, VerifyError};

/// Nomad HTTP API client.
#[derive(Debug, Clone)]
pub struct NomadClient {
    client: Client,
    base_url: String,
}

impl NomadClient {
    /// Create a client for the agent at `base_url` (e.g. `http://control:4646`).
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL of the agent.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/v1/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        handle_response(response).await
    }

    async fn get_text(&self, endpoint: &str) -> Result<String> {
        let url = self.url(endpoint);
        debug!(url = %url, "GET request (text)");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(text)
        } else if status == StatusCode::NOT_FOUND {
            Err(VerifyError::NotFound(text))
        } else {
            Err(VerifyError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    fn fs_endpoint(op: &str, alloc_id: &str, path: &str) -> String {
        format!(
            "client/fs/{op}/alloc/{alloc_id}/{}",
            path.trim_start_matches('/')
        )
    }
}

/// Parse a JSON body or map the status to an error.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse response");
            VerifyError::Serialization(e)
        })
    } else if status == StatusCode::NOT_FOUND {
        Err(VerifyError::NotFound(text))
    } else {
        Err(VerifyError::Api {
            status: status.as_u16(),
            message: text,
        })
    }
}

#[async_trait]
impl JobStatusSource for NomadClient {
    async fn job(&self, job_id: &str) -> Result<JobDescriptor> {
        self.get(&format!("job/{job_id}")).await
    }

    async fn job_allocations(&self, job_id: &str) -> Result<Vec<Allocation>> {
        let allocations: Option<Vec<Allocation>> =
            self.get(&format!("job/{job_id}/allocations")).await?;
        Ok(allocations.unwrap_or_default())
    }
}

#[async_trait]
impl NomadApi for NomadClient {
    async fn allocation(&self, alloc_id: &str) -> Result<Allocation> {
        self.get(&format!("allocation/{alloc_id}")).await
    }

    async fn agent_self(&self) -> Result<AgentInfo> {
        self.get("agent/self").await
    }

    async fn metrics(&self) -> Result<MetricsSummary> {
        self.get("metrics").await
    }

    async fn prometheus_metrics(&self) -> Result<String> {
        self.get_text("metrics?format=prometheus").await
    }

    async fn regions(&self) -> Result<Vec<String>> {
        self.get("regions").await
    }

    async fn scaling_policies(&self) -> Result<Vec<ScalingPolicy>> {
        let policies: Option<Vec<ScalingPolicy>> = self.get("scaling/policies").await?;
        Ok(policies.unwrap_or_default())
    }

    async fn create_snapshot(&self) -> Result<()> {
        let url = self.url("operator/snapshot");
        info!(url = %url, "Requesting Nomad snapshot");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(VerifyError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        // Snapshots stream back as an archive; only a JSON body can carry an error.
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(&body) {
            if let Some(error) = map.get("error") {
                return Err(VerifyError::Api {
                    status: status.as_u16(),
                    message: error.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn read_alloc_file(&self, alloc_id: &str, path: &str) -> Result<String> {
        self.get_text(&Self::fs_endpoint("cat", alloc_id, path))
            .await
    }

    async fn alloc_file_exists(&self, alloc_id: &str, path: &str) -> Result<bool> {
        match self
            .get::<Value>(&Self::fs_endpoint("stat", alloc_id, path))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
