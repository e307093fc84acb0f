use std::{pin::Pin, time::Duration};

use bytes::Bytes;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    artifact::ArtifactNames,
    error::{GenerationError, Result},
    job::{JobId, StatusReport, Submission},
    request::{Capability, GenerationRequest},
};

pub mod openai;
pub mod runway;

pub use openai::OpenAiImages;
pub use runway::Runway;

pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;
pub type ProviderBox = Box<dyn Provider>;

#[derive(
    Debug, Clone, Copy, Display, clap::ValueEnum, Serialize, Deserialize, Hash, PartialEq, Eq,
)]
pub enum ProviderKind {
    #[strum(to_string = "RunwayML")]
    Runway,
    #[strum(to_string = "OpenAI")]
    #[value(name = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Runway => "gen3a",
            ProviderKind::OpenAi => "dall-e-3",
        }
    }

    /// Model for the narrowed retry, if the provider has one.
    pub fn fallback_model(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Runway => Some("gen3a_turbo"),
            ProviderKind::OpenAi => None,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match self {
            ProviderKind::Runway => capability.needs_reference(),
            ProviderKind::OpenAi => capability == Capability::Image,
        }
    }

    pub fn artifact_names(&self) -> ArtifactNames {
        match self {
            ProviderKind::Runway => ArtifactNames::new("runwayml_generation", "mp4", "final_animation.mp4"),
            ProviderKind::OpenAi => ArtifactNames::new("dalle_generation", "png", "final_image.png"),
        }
    }
}

/// A generative media API that accepts a request, runs it and hands out the result.
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn submit<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a, Submission>;

    /// A single status check of a queued job.
    fn check<'a>(&'a self, job: &'a JobId) -> ProviderFuture<'a, StatusReport>;

    fn download<'a>(&'a self, url: &'a str) -> ProviderFuture<'a, Bytes>;
}

pub(crate) fn require_key(key: Option<&str>, var: &str) -> Result<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .ok_or_else(|| GenerationError::configuration(format!("{var} is not set")))
}

pub(crate) fn ensure_supported(kind: ProviderKind, request: &GenerationRequest) -> Result<()> {
    if kind.supports(request.capability()) {
        Ok(())
    } else {
        Err(GenerationError::configuration(format!(
            "{kind} can't do {}",
            request.capability()
        )))
    }
}

/// Turns a non-2xx answer into [`GenerationError::Rejected`], keeping the body.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GenerationError::Rejected { status, body })
}

pub(crate) async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Bytes> {
    info!("Downloading {}", shorten(url));
    let resp = client.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?;
    let bytes = check_status(resp).await?.bytes().await?;
    if bytes.is_empty() {
        return Err(GenerationError::EmptyArtifact {
            url: url.to_string(),
        });
    }
    debug!("Downloaded {} bytes", bytes.len());
    Ok(bytes)
}

/// Data URIs and signed URLs get long, logs only need the start.
pub(crate) fn shorten(s: &str) -> String {
    const MAX: usize = 100;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
