use std::time::Duration;

use async_stream::stream;
use log::{error, info, warn};
use tokio::{pin, time::sleep, time::timeout};
use tokio_stream::{Stream, StreamExt};

use crate::{
    error::{GenerationError, Result},
    job::{GenerationJob, JobId, JobOutput, JobStatus, StatusReport},
    provider::Provider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between two status checks of a job that is still going
    pub interval: Duration,
    /// Wait after a failed status check
    pub retry_interval: Duration,
    /// Total wall-clock time a job gets to finish
    pub budget: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(25),
            retry_interval: Duration::from_secs(20),
            budget: Duration::from_secs(600),
        }
    }
}

/// Every status the provider reports for `job`. Transient errors are logged
/// and retried, anything else ends the stream.
fn status_updates<'a>(
    provider: &'a dyn Provider,
    job: &'a JobId,
    policy: PollPolicy,
) -> impl Stream<Item = Result<StatusReport>> + 'a {
    stream! {
        loop {
            match provider.check(job).await {
                Ok(report) => {
                    let terminal = report.status.is_terminal();
                    yield Ok(report);
                    if terminal {
                        break;
                    }
                    sleep(policy.interval).await;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Status check for job {job} failed, retrying in {:?}: {e}",
                        policy.retry_interval
                    );
                    sleep(policy.retry_interval).await;
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

/// Waits for `job` to finish within the policy's budget and returns its output.
pub async fn poll(
    provider: &dyn Provider,
    job: &mut GenerationJob,
    policy: PollPolicy,
) -> Result<JobOutput> {
    match timeout(policy.budget, watch(provider, job, policy)).await {
        Ok(res) => res,
        Err(_) => {
            job.observe(JobStatus::TimedOut);
            error!("Job {} timed out after {:?}", job.id(), policy.budget);
            Err(GenerationError::Timeout {
                job: job.id().clone(),
                budget: policy.budget,
            })
        }
    }
}

async fn watch(
    provider: &dyn Provider,
    job: &mut GenerationJob,
    policy: PollPolicy,
) -> Result<JobOutput> {
    let id = job.id().clone();
    let updates = status_updates(provider, &id, policy);
    pin!(updates);

    while let Some(report) = updates.try_next().await? {
        match report.progress {
            Some(p) => info!("Job {id}: {} ({:.0}%)", report.status, p * 100.0),
            None => info!("Job {id}: {}", report.status),
        }

        match job.observe(report.status) {
            JobStatus::Succeeded if report.output.is_empty() => {
                return Err(GenerationError::Protocol(format!(
                    "Job {id} succeeded without output"
                )));
            }
            JobStatus::Succeeded => {
                return Ok(JobOutput {
                    urls: report.output,
                    revised_prompt: None,
                });
            }
            JobStatus::Failed => {
                return Err(GenerationError::Failed {
                    job: id.clone(),
                    details: report.details.unwrap_or_else(|| "no details".into()),
                });
            }
            _ => {}
        }
    }

    Err(GenerationError::Protocol(format!(
        "Status updates for job {id} ended early"
    )))
}
