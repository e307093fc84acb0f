use std::path::PathBuf;

use chrono::Local;
use log::{error, info, warn};

use crate::{
    artifact::{ArtifactNames, PersistedArtifact, persist},
    error::{GenerationError, Result},
    job::{GenerationJob, JobId, Submission},
    poll::{PollPolicy, poll},
    provider::{Provider, ProviderBox, shorten},
    request::GenerationRequest,
};

/// Drives one request through a provider: submit, wait, download, save.
pub struct GenerationClient {
    provider: ProviderBox,
    policy: PollPolicy,
    output_dir: PathBuf,
    names: ArtifactNames,
}

#[derive(Debug, Clone)]
pub struct Generation {
    /// `None` when the provider answered synchronously
    pub job: Option<JobId>,
    pub url: String,
    pub revised_prompt: Option<String>,
    pub persisted: PersistedArtifact,
    pub used_fallback: bool,
}

impl GenerationClient {
    pub fn new(provider: ProviderBox, policy: PollPolicy, output_dir: impl Into<PathBuf>) -> Self {
        let names = provider.kind().artifact_names();
        Self {
            provider,
            policy,
            output_dir: output_dir.into(),
            names,
        }
    }

    pub fn with_names(mut self, names: ArtifactNames) -> Self {
        self.names = names;
        self
    }

    pub fn provider(&self) -> &dyn Provider {
        &*self.provider
    }

    /// Runs `primary`; if its submission is refused, `fallback` is submitted once instead.
    pub async fn generate(
        &self,
        primary: &GenerationRequest,
        fallback: Option<&GenerationRequest>,
    ) -> Result<Generation> {
        let (submission, used_fallback) = self.submit_with_fallback(primary, fallback).await?;

        let (job, output) = match submission {
            Submission::Queued(id) => {
                let mut job = GenerationJob::new(id);
                let output = poll(self.provider(), &mut job, self.policy).await?;
                (Some(job.id().clone()), output)
            }
            Submission::Ready(output) => (None, output),
        };

        let url = output
            .first_url()
            .ok_or_else(|| GenerationError::Protocol("Finished job has no output url".into()))?
            .to_string();
        info!("Result available at {}", shorten(&url));

        let bytes = self.provider.download(&url).await?;
        let persisted = persist(&bytes, &self.names, &self.output_dir, &Local::now())?;

        Ok(Generation {
            job,
            url,
            revised_prompt: output.revised_prompt,
            persisted,
            used_fallback,
        })
    }

    async fn submit_with_fallback(
        &self,
        primary: &GenerationRequest,
        fallback: Option<&GenerationRequest>,
    ) -> Result<(Submission, bool)> {
        let err = match self.provider.submit(primary).await {
            Ok(submission) => return Ok((submission, false)),
            Err(e) => e,
        };
        error!("{} submission failed: {err}", self.provider.kind());

        match fallback {
            Some(fallback) if err.allows_fallback() => {
                warn!("Trying the narrowed fallback request");
                let submission = self
                    .provider
                    .submit(fallback)
                    .await
                    .inspect_err(|e| error!("Fallback submission failed as well: {e}"))?;
                Ok((submission, true))
            }
            _ => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use bytes::Bytes;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        job::{JobOutput, JobStatus, StatusReport},
        poll::tests::Scripted,
        provider::{ProviderFuture, ProviderKind},
        request::{Capability, GenerationParams},
    };

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest::new(prompt.into(), Capability::ImageToVideo, GenerationParams::default())
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: std::time::Duration::from_millis(1),
            retry_interval: std::time::Duration::from_millis(1),
            budget: std::time::Duration::from_secs(5),
        }
    }

    /// Refuses the primary prompt, accepts anything else synchronously
    struct PickyProvider {
        refusal: fn() -> GenerationError,
        submits: Arc<AtomicUsize>,
    }

    impl Provider for PickyProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn submit<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a, Submission> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            let res = if request.prompt() == "primary" {
                Err((self.refusal)())
            } else {
                Ok(Submission::Ready(JobOutput {
                    urls: vec!["http://x/a.png".into()],
                    revised_prompt: Some("revised".into()),
                }))
            };
            Box::pin(async move { res })
        }

        fn check<'a>(&'a self, _: &'a JobId) -> ProviderFuture<'a, StatusReport> {
            Box::pin(async { Err(GenerationError::Protocol("not polled".into())) })
        }

        fn download<'a>(&'a self, _: &'a str) -> ProviderFuture<'a, Bytes> {
            Box::pin(async { Ok(Bytes::from_static(b"png")) })
        }
    }

    #[tokio::test]
    async fn queued_job_is_polled_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new(vec![Ok(StatusReport {
            output: vec!["http://x/a.mp4".into()],
            ..StatusReport::new(JobStatus::Succeeded)
        })]);
        let client = GenerationClient::new(Box::new(provider), fast_policy(), dir.path());

        let generation = client.generate(&request("primary"), None).await.unwrap();

        assert_eq!(generation.job.as_ref().map(JobId::as_str), Some("job123"));
        assert_eq!(generation.url, "http://x/a.mp4");
        assert!(!generation.used_fallback);
        assert_eq!(generation.persisted.canonical, dir.path().join("final_animation.mp4"));
        assert_eq!(fs::read(&generation.persisted.canonical).unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn refused_submission_falls_back_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = PickyProvider {
            refusal: || GenerationError::Rejected {
                status: StatusCode::BAD_REQUEST,
                body: "bad duration".into(),
            },
            submits: Arc::new(AtomicUsize::new(0)),
        };
        let submits = provider.submits.clone();
        let client = GenerationClient::new(Box::new(provider), fast_policy(), dir.path())
            .with_names(ArtifactNames::new("test", "png", "latest.png"));

        let generation = client
            .generate(&request("primary"), Some(&request("fallback")))
            .await
            .unwrap();

        assert!(generation.used_fallback);
        assert_eq!(submits.load(Ordering::SeqCst), 2);
        assert_eq!(generation.job, None);
        assert_eq!(generation.revised_prompt.as_deref(), Some("revised"));
        assert_eq!(fs::read(dir.path().join("latest.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn configuration_errors_skip_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let provider = PickyProvider {
            refusal: || GenerationError::configuration("OPENAI_API_KEY is not set"),
            submits: Arc::new(AtomicUsize::new(0)),
        };
        let submits = provider.submits.clone();
        let client = GenerationClient::new(Box::new(provider), fast_policy(), dir.path());

        let err = client
            .generate(&request("primary"), Some(&request("fallback")))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Configuration(_)));
        assert_eq!(submits.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
