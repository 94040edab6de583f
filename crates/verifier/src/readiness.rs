//! Job readiness polling.
//!
//! A job is ready once Nomad reports it `running` and at least one of its
//! allocations has client status `running`. Fetch errors during a poll count
//! as "not ready yet"; only the deadline ends the loop early.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ReadinessSettings;
use crate::error::{Result, VerifyError};
use crate::nomad::JobStatusSource;

/// Default time to wait for a job.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a job until it is ready or the deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessVerifier {
    timeout: Duration,
    interval: Duration,
}

impl Default for ReadinessVerifier {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ReadinessVerifier {
    /// Create a verifier with the given deadline and poll interval.
    ///
    /// # Errors
    /// Returns a configuration error if either duration is zero.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(VerifyError::Config(
                "readiness timeout must be positive".to_string(),
            ));
        }
        if interval.is_zero() {
            return Err(VerifyError::Config(
                "readiness poll interval must be positive".to_string(),
            ));
        }
        Ok(Self { timeout, interval })
    }

    /// Build from configuration settings.
    pub fn from_settings(settings: &ReadinessSettings) -> Result<Self> {
        Self::new(settings.timeout(), settings.interval())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until the job is ready (`Ok(true)`) or the deadline passes
    /// (`Ok(false)`).
    ///
    /// # Errors
    /// Returns a configuration error for an empty job ID. Fetch failures are
    /// never returned.
    pub async fn wait_for_job<S>(&self, source: &S, job_id: &str) -> Result<bool>
    where
        S: JobStatusSource + ?Sized,
    {
        if job_id.trim().is_empty() {
            return Err(VerifyError::Config("job ID must not be empty".to_string()));
        }

        info!(
            job_id = %job_id,
            timeout_secs = self.timeout.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Waiting for job to be ready"
        );

        let start = Instant::now();
        let mut attempts: u32 = 0;

        // Neither a slow poll nor the final sleep may run past the deadline.
        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            attempts += 1;

            match tokio::time::timeout(remaining, job_ready(source, job_id)).await {
                Ok(Ok(true)) => {
                    info!(job_id = %job_id, attempts, "Job is ready");
                    return Ok(true);
                }
                Ok(Ok(false)) => {
                    debug!(
                        job_id = %job_id,
                        attempt = attempts,
                        elapsed_secs = start.elapsed().as_secs(),
                        "Job not ready yet"
                    );
                }
                Ok(Err(e)) => {
                    debug!(job_id = %job_id, attempt = attempts, error = %e, "Readiness poll failed");
                }
                Err(_) => {
                    debug!(job_id = %job_id, attempt = attempts, "Readiness poll hit the deadline");
                }
            }

            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }

        warn!(
            job_id = %job_id,
            attempts,
            timeout_secs = self.timeout.as_secs(),
            "Timed out waiting for job"
        );
        Ok(false)
    }
}

/// Single readiness probe. Errors propagate to the caller.
pub async fn job_ready<S>(source: &S, job_id: &str) -> Result<bool>
where
    S: JobStatusSource + ?Sized,
{
    let job = source.job(job_id).await?;
    if !job.is_running() {
        return Ok(false);
    }

    let allocations = source.job_allocations(job_id).await?;
    Ok(allocations.iter().any(|alloc| alloc.is_running()))
}
