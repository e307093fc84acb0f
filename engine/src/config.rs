use std::{path::PathBuf, time::Duration};

use color_eyre::{Result, eyre::eyre};
use log::{debug, info, warn};
use rand::Rng;

use crate::{
    poll::PollPolicy,
    prompt::{
        DEFAULT_ANIMATION_TYPE, DEFAULT_CAMERA_STABILITY, DEFAULT_DANCE_QUALITY, DEFAULT_LIGHTING,
        DEFAULT_MOTION_DESCRIPTORS, DEFAULT_STYLE, DEFAULT_VISUAL_QUALITY, Descriptors, Templates,
    },
    provider::{self, ProviderBox, ProviderKind},
    request::{Capability, GenerationParams, ReferenceMedia},
};

const TEMPLATES_FILE_NAME: &str = "templates.ron";
const APP_DIR: &str = "reelgen";

/// Everything a run needs. Every option can be given as a flag or through
/// its environment variable.
#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// Used verbatim instead of a template
    #[arg(long, env = "PROMPT_OVERRIDE")]
    pub prompt: Option<String>,

    #[arg(long, env = "DANCING_MOTION_PROMPT", hide = true)]
    pub legacy_prompt: Option<String>,

    /// Key into the prompt templates; unknown keys use `dancing`
    #[arg(long, env = "ANIMATION_TYPE", default_value = DEFAULT_ANIMATION_TYPE)]
    pub animation_type: String,

    #[arg(long, env = "RUNWAYML_API_KEY", hide_env_values = true)]
    pub runway_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "PROVIDER", value_enum, default_value_t = ProviderKind::Runway)]
    pub provider: ProviderKind,

    #[arg(long, env = "CAPABILITY", value_enum, default_value_t = Capability::ImageToVideo)]
    pub capability: Capability,

    /// Defaults to the provider's standard model
    #[arg(long, env = "MODEL")]
    pub model: Option<String>,

    /// Video length in seconds, capped at 10
    #[arg(long, env = "DURATION", default_value_t = 10)]
    pub duration: u32,

    #[arg(long, env = "ASPECT_RATIO", default_value = "9:16")]
    pub aspect_ratio: String,

    /// Random when empty or not a number
    #[arg(long, env = "MOTION_SEED")]
    pub seed: Option<String>,

    #[arg(long, env = "MOTION_STRENGTH", default_value_t = 6)]
    pub motion_strength: u32,

    #[arg(long, env = "MOTION_GUIDANCE", default_value_t = 12)]
    pub motion_guidance: u32,

    /// 0 keeps the camera static
    #[arg(long, env = "CAMERA_MOTION", default_value_t = 0)]
    pub camera_motion: u32,

    #[arg(long, env = "RUNWAY_NEGATIVE_PROMPT")]
    pub negative_prompt: Option<String>,

    #[arg(long, env = "WATERMARK", default_value_t = false, action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
    pub watermark: bool,

    #[arg(long, env = "INTERPOLATE", default_value_t = true, action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
    pub interpolate: bool,

    #[arg(long = "loop", env = "LOOP", default_value_t = false, action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
    pub looping: bool,

    #[arg(long, env = "IMAGE_SIZE", default_value = "1024x1024")]
    pub image_size: String,

    #[arg(long, env = "IMAGE_QUALITY", default_value = "hd")]
    pub image_quality: String,

    #[arg(long, env = "IMAGE_STYLE", default_value = "vivid")]
    pub image_style: String,

    /// Path or URL of the image/video to start from
    #[arg(long, env = "REFERENCE_MEDIA")]
    pub reference: Option<String>,

    #[arg(long, env = "MOTION_DESCRIPTORS", value_delimiter = ',', default_value = DEFAULT_MOTION_DESCRIPTORS)]
    pub motion_descriptors: Vec<String>,

    #[arg(long, env = "CAMERA_STABILITY", value_delimiter = ',', default_value = DEFAULT_CAMERA_STABILITY)]
    pub camera_stability: Vec<String>,

    #[arg(long, env = "DANCE_QUALITY", value_delimiter = ',', default_value = DEFAULT_DANCE_QUALITY)]
    pub dance_quality: Vec<String>,

    #[arg(long, env = "VISUAL_QUALITY", value_delimiter = ',', default_value = DEFAULT_VISUAL_QUALITY)]
    pub visual_quality: Vec<String>,

    #[arg(long, env = "LIGHTING", default_value = DEFAULT_LIGHTING)]
    pub lighting: String,

    #[arg(long, env = "STYLE", default_value = DEFAULT_STYLE)]
    pub style: String,

    /// RON file with extra prompt templates
    #[arg(long, env = "TEMPLATES_FILE")]
    pub templates_file: Option<PathBuf>,

    #[arg(long, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 25)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "POLL_RETRY_SECS", default_value_t = 20)]
    pub poll_retry_secs: u64,

    #[arg(long, env = "POLL_BUDGET_SECS", default_value_t = 600)]
    pub poll_budget_secs: u64,

    /// Receives the JSON result of the run
    #[arg(long, env = "N8N_WEBHOOK")]
    pub webhook_url: Option<String>,

    /// Write a JSON report next to the artifact
    #[arg(long, env = "WRITE_SIDECAR", default_value_t = false, action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
    pub sidecar: bool,

    #[arg(long, env = "RUNWAY_BASE_URL", default_value = provider::runway::DEFAULT_BASE_URL)]
    pub runway_base_url: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = provider::openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,
}

impl Config {
    pub fn prompt_override(&self) -> Option<String> {
        self.prompt.clone().or_else(|| self.legacy_prompt.clone())
    }

    pub fn descriptors(&self) -> Descriptors {
        let clean = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Descriptors {
            motion: clean(&self.motion_descriptors),
            camera_stability: clean(&self.camera_stability),
            dance_quality: clean(&self.dance_quality),
            visual_quality: clean(&self.visual_quality),
            lighting: self.lighting.clone(),
            style: self.style.clone(),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            retry_interval: Duration::from_secs(self.poll_retry_secs),
            budget: Duration::from_secs(self.poll_budget_secs),
        }
    }

    /// Built-in templates, extended by the configured or default RON file.
    pub fn templates(&self) -> Result<Templates> {
        let path = match &self.templates_file {
            Some(path) => Some(path.clone()),
            None => default_templates_path().filter(|p| p.exists()),
        };
        match path {
            Some(path) => {
                info!("Loading prompt templates from {}", path.display());
                Ok(Templates::default().merge(Templates::load_ron(&path)?))
            }
            None => Ok(Templates::default()),
        }
    }

    /// Parameters for the configured provider. A missing seed gets rolled here.
    pub fn params<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GenerationParams> {
        let reference = self
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(ReferenceMedia::resolve)
            .transpose()?;
        let seed =
            parse_seed(self.seed.as_deref()).unwrap_or_else(|| rng.gen_range(1..=1_000_000));
        debug!("Using seed {seed}");

        Ok(GenerationParams {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| self.provider.default_model().to_string()),
            duration: self.duration,
            aspect_ratio: self.aspect_ratio.clone(),
            seed: Some(seed),
            motion_strength: self.motion_strength,
            motion_guidance: self.motion_guidance,
            static_camera: self.camera_motion == 0,
            negative_prompt: self
                .negative_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
            watermark: self.watermark,
            interpolate: Some(self.interpolate),
            looping: Some(self.looping),
            image_size: self.image_size.clone(),
            image_quality: self.image_quality.clone(),
            image_style: self.image_style.clone(),
            reference,
        })
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Runway => self.runway_api_key.as_deref(),
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
        }
    }

    pub fn make_provider(&self, kind: ProviderKind) -> ProviderBox {
        match kind {
            ProviderKind::Runway => Box::new(provider::Runway::new(
                self.runway_api_key.clone(),
                &self.runway_base_url,
            )),
            ProviderKind::OpenAi => Box::new(provider::OpenAiImages::new(
                self.openai_api_key.clone(),
                &self.openai_base_url,
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.provider.supports(self.capability) {
            return Err(eyre!(
                "{} can't do {}, pick another provider or capability",
                self.provider,
                self.capability
            ));
        }
        if self.poll_budget_secs == 0 {
            return Err(eyre!("POLL_BUDGET_SECS must be positive"));
        }
        Ok(())
    }
}

fn parse_seed(text: Option<&str>) -> Option<u32> {
    let text = text.map(str::trim).filter(|t| !t.is_empty())?;
    match text.parse() {
        Ok(seed) => Some(seed),
        Err(_) => {
            warn!("MOTION_SEED {text:?} is not a number, rolling a random seed");
            None
        }
    }
}

pub fn default_templates_path() -> Option<PathBuf> {
    dirs::config_local_dir().map(|d| d.join(APP_DIR).join(TEMPLATES_FILE_NAME))
}
