use std::{fs, time::Instant};

use color_eyre::Result;
use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    artifact::{ArtifactNames, write_sidecar},
    client::{Generation, GenerationClient},
    config::Config,
    error::GenerationError,
    prompt::PromptBuilder,
    provider::{ProviderKind, require_key, shorten},
    request::{Capability, GenerationParams, GenerationRequest, ReferenceMedia},
    webhook::{GenerationReport, notify},
};

pub const BASE_IMAGE_NAME: &str = "base_image.png";

/// One complete run: prompt, optional base image, generation, reporting.
pub async fn run(config: &Config) -> Result<GenerationReport> {
    config.validate()?;
    let started = Instant::now();
    let mut rng = StdRng::from_entropy();

    let builder = PromptBuilder::new(
        config.animation_type.clone(),
        config.prompt_override(),
        config.templates()?,
        config.descriptors(),
    );
    let prompt = builder.build_prompt(&mut rng);
    let params = config.params(&mut rng)?;

    info!(
        "{} {} run, animation type {}",
        config.provider,
        config.capability,
        builder.animation_type()
    );
    info!(
        "duration={}s, aspect ratio={}, strength={}, guidance={}, seed={:?}, static camera={}",
        params.duration,
        params.aspect_ratio,
        params.motion_strength,
        params.motion_guidance,
        params.seed,
        params.static_camera
    );
    info!("Prompt: {}", shorten(&prompt));

    let model = params.model.clone();
    let outcome = generate(config, &builder, prompt.clone(), params).await;

    let report = GenerationReport {
        success: outcome.is_ok(),
        image_url: outcome.as_ref().ok().map(|g| g.url.clone()),
        local_filename: outcome.as_ref().ok().and_then(|g| {
            g.persisted
                .timestamped
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        }),
        original_prompt: prompt,
        revised_prompt: outcome.as_ref().ok().and_then(|g| g.revised_prompt.clone()),
        generation_time: started.elapsed().as_secs_f64(),
        model: match &outcome {
            Ok(g) if g.used_fallback => config
                .provider
                .fallback_model()
                .map(String::from)
                .unwrap_or(model),
            _ => model,
        },
        size: Some(match config.capability {
            Capability::Image => config.image_size.clone(),
            _ => config.aspect_ratio.clone(),
        }),
        quality: (config.capability == Capability::Image).then(|| config.image_quality.clone()),
    };

    if let (true, Ok(generation)) = (config.sidecar, &outcome) {
        write_sidecar(&generation.persisted.sidecar_path(), &report)?;
    }

    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        if let Err(e) = notify(&reqwest::Client::new(), url, &report).await {
            warn!("Webhook notification failed: {e}");
        }
    }

    let generation = outcome?;
    info!(
        "Done in {:.1}s: {} (canonical copy {})",
        report.generation_time,
        generation.persisted.timestamped.display(),
        generation.persisted.canonical.display()
    );
    Ok(report)
}

async fn generate(
    config: &Config,
    builder: &PromptBuilder,
    prompt: String,
    mut params: GenerationParams,
) -> Result<Generation, GenerationError> {
    // nothing goes over the wire before the main provider's key is known to be there
    require_key(config.api_key(config.provider), key_var(config.provider))?;

    if params.reference.is_none() {
        match config.capability {
            Capability::ImageToVideo => {
                params.reference = Some(base_image(config, builder).await?);
            }
            Capability::VideoToVideo => {
                return Err(GenerationError::configuration(
                    "video-to-video needs REFERENCE_MEDIA",
                ));
            }
            Capability::Image => {}
        }
    }

    let primary = GenerationRequest::new(prompt, config.capability, params);
    let fallback = config
        .provider
        .fallback_model()
        .map(|model| primary.narrowed(builder.fallback_prompt(), model));

    let client = GenerationClient::new(
        config.make_provider(config.provider),
        config.poll_policy(),
        &config.output_dir,
    );
    client.generate(&primary, fallback.as_ref()).await
}

/// Generates the still image an image-to-video job starts from.
async fn base_image(
    config: &Config,
    builder: &PromptBuilder,
) -> Result<ReferenceMedia, GenerationError> {
    info!("No reference media configured, generating a base image first");
    let request = GenerationRequest::new(
        builder.base_image_prompt(),
        Capability::Image,
        GenerationParams {
            model: ProviderKind::OpenAi.default_model().into(),
            image_size: config.image_size.clone(),
            image_quality: config.image_quality.clone(),
            image_style: config.image_style.clone(),
            ..Default::default()
        },
    );

    let client = GenerationClient::new(
        config.make_provider(ProviderKind::OpenAi),
        config.poll_policy(),
        &config.output_dir,
    )
    .with_names(ArtifactNames::new("dalle_generation", "png", BASE_IMAGE_NAME));
    let generation = client.generate(&request, None).await?;

    let bytes = fs::read(&generation.persisted.canonical)?;
    Ok(ReferenceMedia::from_bytes(&bytes, "image/png"))
}

fn key_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Runway => "RUNWAYML_API_KEY",
        ProviderKind::OpenAi => "OPENAI_API_KEY",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::parse;

    #[tokio::test]
    async fn missing_key_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = parse(&[
            "--provider",
            "runway",
            "--runway-api-key",
            "",
            "--reference",
            "",
            "--output-dir",
            dir.path().to_str().unwrap(),
            "--runway-base-url",
            "http://127.0.0.1:9",
            "--openai-base-url",
            "http://127.0.0.1:9",
        ]);

        let err = run(&cfg).await.unwrap_err();
        let err = err.downcast_ref::<GenerationError>().unwrap();
        assert!(matches!(err, GenerationError::Configuration(msg) if msg.contains("RUNWAYML_API_KEY")));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn video_to_video_needs_reference() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = parse(&[
            "--capability",
            "video-to-video",
            "--runway-api-key",
            "key",
            "--reference",
            "",
            "--output-dir",
            dir.path().to_str().unwrap(),
            "--runway-base-url",
            "http://127.0.0.1:9",
        ]);

        let err = run(&cfg).await.unwrap_err();
        assert!(err.to_string().contains("REFERENCE_MEDIA"));
    }
}
