use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::job::JobId;

/// Errors returned while talking to a generation provider
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider rejected the request ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Job {job} did not reach a terminal status within {budget:?}")]
    Timeout { job: JobId, budget: Duration },

    #[error("Job {job} failed: {details}")]
    Failed { job: JobId, details: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered, but not in the shape we expected
    #[error("Unexpected provider response: {0}")]
    Protocol(String),

    #[error("Downloaded artifact from {url} is empty")]
    EmptyArtifact { url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Errors that are worth another status check while a job is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::Transport(_) | Self::Protocol(_)
        )
    }

    /// Only a refusal by the provider earns a narrowed fallback submission.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_keeps_body_verbatim() {
        let err = GenerationError::Rejected {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: r#"{"error":"boom"}"#.into(),
        };
        assert_eq!(
            err.to_string(),
            r#"Provider rejected the request (500 Internal Server Error): {"error":"boom"}"#
        );
    }

    #[test]
    fn configuration_errors_are_final() {
        let err = GenerationError::configuration("RUNWAYML_API_KEY not set");
        assert!(!err.is_transient());
        assert!(!err.allows_fallback());
    }

    #[tokio::test]
    async fn unreachable_provider_is_retried_but_not_narrowed() {
        // nothing listens on the discard port
        let err: GenerationError = reqwest::get("http://127.0.0.1:9/")
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert!(err.is_transient());
        assert!(!err.allows_fallback());
    }
}
