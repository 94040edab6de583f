//! Running checks and reporting the results.

use std::fmt::Write as _;
use std::time::Instant;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checks::{CheckContext, CheckId, CheckOutcome};
use crate::config::{HostProfile, IntegrationPaths};
use crate::error::{Result, VerifyError};
use crate::host::HOST_CHECKS;
use crate::readiness::ReadinessVerifier;

/// Final status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Skipped,
    /// An assertion did not hold.
    Failed,
    /// A fetch or transport failure prevented the check from finishing.
    Errored,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    fn from_outcome(name: &str, outcome: Result<CheckOutcome>, started: Instant) -> Self {
        let (status, message) = match outcome {
            Ok(CheckOutcome::Passed) => (CheckStatus::Passed, None),
            Ok(CheckOutcome::Skipped(reason)) => (CheckStatus::Skipped, Some(reason)),
            Err(VerifyError::Assertion(message)) => (CheckStatus::Failed, Some(message)),
            Err(e) => (CheckStatus::Errored, Some(e.to_string())),
        };
        Self {
            name: name.to_string(),
            status,
            message,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Results of a suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    /// Whether the example job became ready, when readiness was awaited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<bool>,
    pub results: Vec<CheckResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn new(readiness: Option<bool>) -> Self {
        Self {
            started_at: Utc::now(),
            readiness,
            results: Vec::new(),
        }
    }

    #[must_use]
    pub fn count(&self, status: CheckStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True when no check failed or errored.
    #[must_use]
    pub fn success(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.status, CheckStatus::Passed | CheckStatus::Skipped))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable rendering for a terminal.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {}",
            "Mantl federation checks".bold(),
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().bright_black()
        );
        match self.readiness {
            Some(true) => {
                let _ = writeln!(out, "  {} example job ready", "✓".green());
            }
            Some(false) => {
                let _ = writeln!(out, "  {} example job not ready before timeout", "⚠".yellow());
            }
            None => {}
        }

        for result in &self.results {
            let mark = match result.status {
                CheckStatus::Passed => "✓".green(),
                CheckStatus::Skipped => "-".bright_black(),
                CheckStatus::Failed => "✗".red(),
                CheckStatus::Errored => "!".red(),
            };
            let _ = write!(
                out,
                "  {mark} {} {}",
                result.name,
                format!("({}ms)", result.duration_ms).bright_black()
            );
            if let Some(message) = &result.message {
                let _ = write!(out, " - {message}");
            }
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "\n{} passed, {} skipped, {} failed, {} errored",
            self.count(CheckStatus::Passed).to_string().green(),
            self.count(CheckStatus::Skipped),
            self.count(CheckStatus::Failed).to_string().red(),
            self.count(CheckStatus::Errored).to_string().red(),
        );
        out
    }
}

/// Run the selected live checks one after another.
///
/// When `readiness` is given the example job is awaited first. A timed-out
/// wait is recorded in the report and the checks still run.
pub async fn run_live_checks(
    ctx: &CheckContext,
    selection: &[CheckId],
    readiness: Option<&ReadinessVerifier>,
) -> SuiteReport {
    let ready = match readiness {
        Some(verifier) => {
            let job_id = &ctx.expect().job_id;
            match verifier.wait_for_job(ctx.nomad.as_ref(), job_id).await {
                Ok(ready) => Some(ready),
                Err(e) => {
                    warn!(error = %e, "Readiness wait could not start");
                    Some(false)
                }
            }
        }
        None => None,
    };

    let mut report = SuiteReport::new(ready);
    for id in selection {
        info!(check = %id, "Running check");
        let started = Instant::now();
        let outcome = id.run(ctx).await;
        let result = CheckResult::from_outcome(id.name(), outcome, started);
        log_result(&result);
        report.results.push(result);
    }
    report
}

/// Run every host layout check against `profile`.
pub async fn run_host_checks(profile: &HostProfile, paths: &IntegrationPaths) -> SuiteReport {
    let mut report = SuiteReport::new(None);
    for check in HOST_CHECKS {
        let started = Instant::now();
        let outcome = check.run(profile, paths).await;
        let result = CheckResult::from_outcome(check.name, outcome, started);
        log_result(&result);
        report.results.push(result);
    }
    report
}

fn log_result(result: &CheckResult) {
    match result.status {
        CheckStatus::Passed | CheckStatus::Skipped => {
            info!(check = %result.name, status = ?result.status, duration_ms = result.duration_ms, "Check finished");
        }
        CheckStatus::Failed | CheckStatus::Errored => {
            warn!(
                check = %result.name,
                status = ?result.status,
                message = result.message.as_deref().unwrap_or_default(),
                "Check did not pass"
            );
        }
    }
}
