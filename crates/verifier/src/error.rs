//! Error types for the federation verifier.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to the federation or asserting on its state.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Kubernetes API call failed.
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// No usable Kubernetes client configuration was found.
    #[error("Kubernetes configuration error: {0}")]
    KubeConfig(String),

    /// Reading a local file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration or input.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An expected field or value was missing or wrong.
    #[error("{0}")]
    Assertion(String),
}

impl VerifyError {
    /// Whether this error is an assertion failure rather than a failed fetch.
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion(_))
    }

    /// Whether the remote side reported the resource as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { status, .. } => *status == 404,
            Self::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

/// Fail with an assertion error unless `condition` holds.
pub fn require(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(VerifyError::Assertion(message.into()))
    }
}

/// Unwrap an optional value or fail with an assertion error.
pub fn require_some<T>(value: Option<T>, message: impl Into<String>) -> Result<T> {
    value.ok_or_else(|| VerifyError::Assertion(message.into()))
}
