use bytes::Bytes;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    error::GenerationError,
    job::{JobId, JobOutput, StatusReport, Submission},
    request::GenerationRequest,
};

use super::{
    Provider, ProviderFuture, ProviderKind, SUBMIT_TIMEOUT, check_status, ensure_supported,
    fetch_bytes, require_key, shorten,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI image generations. They answer synchronously, so nothing is ever polled.
#[derive(Clone)]
pub struct OpenAiImages {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiImages {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    style: &'a str,
}

impl<'a> From<&'a GenerationRequest> for ImageBody<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        let params = request.params();
        ImageBody {
            model: &params.model,
            prompt: request.prompt(),
            n: 1,
            size: &params.image_size,
            quality: &params.image_quality,
            style: &params.image_style,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

impl Provider for OpenAiImages {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn submit<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a, Submission> {
        Box::pin(async move {
            let key = require_key(self.api_key.as_deref(), "OPENAI_API_KEY")?;
            ensure_supported(self.kind(), request)?;
            info!(
                "Requesting {} image: {}",
                request.params().model,
                shorten(request.prompt())
            );

            let resp = self
                .client
                .post(format!("{}/v1/images/generations", self.base_url))
                .bearer_auth(&key)
                .timeout(SUBMIT_TIMEOUT)
                .json(&ImageBody::from(request))
                .send()
                .await?;
            let text = check_status(resp).await?.text().await?;
            let images: ImagesResponse = serde_json::from_str(&text)?;
            let image = images
                .data
                .into_iter()
                .next()
                .ok_or_else(|| GenerationError::Protocol(format!("No image in response:\n{text}")))?;
            let url = image
                .url
                .ok_or_else(|| GenerationError::Protocol(format!("Image without url:\n{text}")))?;

            Ok(Submission::Ready(JobOutput {
                urls: vec![url],
                revised_prompt: image.revised_prompt,
            }))
        })
    }

    fn check<'a>(&'a self, job: &'a JobId) -> ProviderFuture<'a, StatusReport> {
        Box::pin(async move {
            Err(GenerationError::Protocol(format!(
                "OpenAI image generations have no status endpoint (job {job})"
            )))
        })
    }

    fn download<'a>(&'a self, url: &'a str) -> ProviderFuture<'a, Bytes> {
        Box::pin(fetch_bytes(&self.client, url))
    }
}
