use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Opaque identifier handed out by a provider when a job is accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

/// A remote job as tracked by the run that created it.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    id: JobId,
    status: JobStatus,
}

impl GenerationJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Records a newly observed status. Terminal statuses stick.
    pub fn observe(&mut self, status: JobStatus) -> JobStatus {
        if self.status.is_terminal() {
            debug!(
                "Ignoring status {status} for job {}, already {}",
                self.id, self.status
            );
        } else {
            self.status = status;
        }
        self.status
    }
}

/// One answer of a provider's status endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: JobStatus,
    pub progress: Option<f64>,
    pub output: Vec<String>,
    pub details: Option<String>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            output: vec![],
            details: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub urls: Vec<String>,
    pub revised_prompt: Option<String>,
}

impl JobOutput {
    pub fn first_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// What a provider hands back right after accepting a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The job runs remotely and has to be polled
    Queued(JobId),
    /// The provider answered synchronously
    Ready(JobOutput),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_sticks() {
        let mut job = GenerationJob::new(JobId::new("job123"));
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.observe(JobStatus::Running), JobStatus::Running);
        assert_eq!(job.observe(JobStatus::Failed), JobStatus::Failed);
        assert_eq!(job.observe(JobStatus::Running), JobStatus::Failed);
        assert_eq!(job.observe(JobStatus::Succeeded), JobStatus::Failed);
    }

    #[test]
    fn status_display_matches_wire_names() {
        assert_eq!(JobStatus::TimedOut.to_string(), "TIMED_OUT");
        assert_eq!(JobStatus::Succeeded.to_string(), "SUCCEEDED");
    }
}
