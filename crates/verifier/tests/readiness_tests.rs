//! Readiness polling against a scripted job status source.
//!
//! The tokio clock is paused so the poll loop runs through its full deadline
//! without real sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mantl_verify::nomad::{Allocation, JobDescriptor, JobStatusSource};
use mantl_verify::readiness::job_ready;
use mantl_verify::{ReadinessVerifier, Result, VerifyError};
use tokio::time::Instant;

const JOB: &str = "mantl-kubernetes-example";

#[derive(Clone, Copy, Debug)]
enum Step {
    Unreachable,
    JobPending,
    NoAllocations,
    AllocationPending,
    Ready,
    /// Answers as ready, but only after the API has hung for a while.
    Hung,
}

/// Answers each poll with the next scripted step, repeating the last one.
struct ScriptedSource {
    steps: Vec<Step>,
    polls: AtomicUsize,
}

impl ScriptedSource {
    fn new(steps: &[Step]) -> Self {
        Self {
            steps: steps.to_vec(),
            polls: AtomicUsize::new(0),
        }
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn step(&self, poll: usize) -> Step {
        self.steps[poll.min(self.steps.len() - 1)]
    }
}

fn allocation(client_status: &str) -> Allocation {
    Allocation {
        id: "alloc-1".to_string(),
        job_id: JOB.to_string(),
        client_status: client_status.to_string(),
        ..Allocation::default()
    }
}

#[async_trait]
impl JobStatusSource for ScriptedSource {
    async fn job(&self, job_id: &str) -> Result<JobDescriptor> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let status = match self.step(poll) {
            Step::Unreachable => {
                return Err(VerifyError::Api {
                    status: 503,
                    message: "no cluster leader".to_string(),
                })
            }
            Step::JobPending => "pending",
            Step::Hung => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "running"
            }
            Step::NoAllocations | Step::AllocationPending | Step::Ready => "running",
        };
        Ok(JobDescriptor {
            id: job_id.to_string(),
            status: status.to_string(),
            ..JobDescriptor::default()
        })
    }

    async fn job_allocations(&self, _job_id: &str) -> Result<Vec<Allocation>> {
        let poll = self.polls.load(Ordering::SeqCst).saturating_sub(1);
        Ok(match self.step(poll) {
            Step::NoAllocations => Vec::new(),
            Step::AllocationPending => vec![allocation("pending")],
            Step::Ready | Step::Hung => vec![allocation("pending"), allocation("running")],
            Step::Unreachable | Step::JobPending => unreachable!("job was not running"),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_ready_on_first_poll() {
    let source = ScriptedSource::new(&[Step::Ready]);
    let start = Instant::now();

    let ready = ReadinessVerifier::default()
        .wait_for_job(&source, JOB)
        .await
        .unwrap();

    assert!(ready);
    assert_eq!(source.polls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_never_running_times_out_after_thirty_polls() {
    let source = ScriptedSource::new(&[Step::JobPending]);
    let start = Instant::now();

    let ready = ReadinessVerifier::default()
        .wait_for_job(&source, JOB)
        .await
        .unwrap();

    assert!(!ready);
    assert_eq!(source.polls(), 30);
    assert_eq!(start.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let source = ScriptedSource::new(&[Step::Unreachable, Step::Unreachable, Step::Ready]);
    let start = Instant::now();

    let ready = ReadinessVerifier::default()
        .wait_for_job(&source, JOB)
        .await
        .unwrap();

    assert!(ready);
    assert_eq!(source.polls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_a_running_allocation() {
    let source = ScriptedSource::new(&[
        Step::NoAllocations,
        Step::AllocationPending,
        Step::AllocationPending,
        Step::Ready,
    ]);

    let verifier = ReadinessVerifier::new(Duration::from_secs(10), Duration::from_secs(1)).unwrap();
    let ready = verifier.wait_for_job(&source, JOB).await.unwrap();

    assert!(ready);
    assert_eq!(source.polls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_short_timeout_bounds_attempts() {
    let source = ScriptedSource::new(&[Step::AllocationPending]);

    let verifier = ReadinessVerifier::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    let ready = verifier.wait_for_job(&source, JOB).await.unwrap();

    // Polls at 0s, 2s and 4s before the 5s deadline.
    assert!(!ready);
    assert_eq!(source.polls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_poll_is_cut_off_at_deadline() {
    let source = ScriptedSource::new(&[Step::Hung]);
    let start = Instant::now();

    let verifier = ReadinessVerifier::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    let ready = verifier.wait_for_job(&source, JOB).await.unwrap();

    assert!(!ready);
    assert_eq!(source.polls(), 1);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_last_sleep_is_cut_short_at_deadline() {
    let source = ScriptedSource::new(&[Step::JobPending]);
    let start = Instant::now();

    let verifier = ReadinessVerifier::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    assert!(!verifier.wait_for_job(&source, JOB).await.unwrap());

    // Polls at 0s, 2s and 4s, then a 1s sleep instead of a full interval.
    assert_eq!(source.polls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_empty_job_id_is_rejected() {
    let source = ScriptedSource::new(&[Step::Ready]);

    let err = ReadinessVerifier::default()
        .wait_for_job(&source, "  ")
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Config(_)));
    assert_eq!(source.polls(), 0);
}

#[tokio::test]
async fn test_single_probe_propagates_errors() {
    let source = ScriptedSource::new(&[Step::Unreachable]);
    let err = job_ready(&source, JOB).await.unwrap_err();
    assert!(matches!(err, VerifyError::Api { status: 503, .. }));

    let source = ScriptedSource::new(&[Step::AllocationPending]);
    assert!(!job_ready(&source, JOB).await.unwrap());
}
