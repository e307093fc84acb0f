use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{GenerationError, Result};

pub const MAX_VIDEO_DURATION: u32 = 10;

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    Default,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Image,
    #[default]
    ImageToVideo,
    VideoToVideo,
}

impl Capability {
    pub fn needs_reference(&self) -> bool {
        matches!(self, Capability::ImageToVideo | Capability::VideoToVideo)
    }
}

/// Image or video the provider should start from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceMedia {
    Url(String),
    DataUri(String),
}

impl ReferenceMedia {
    /// URLs (including `data:` URIs) are passed through, anything else is read as a file.
    pub fn resolve(location: &str) -> Result<Self> {
        if ["http://", "https://", "data:"]
            .iter()
            .any(|scheme| location.starts_with(scheme))
        {
            return Ok(Self::Url(location.to_string()));
        }
        let path = Path::new(location);
        let mime = mime_for(path)?;
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(&data, mime))
    }

    pub fn from_bytes(data: &[u8], mime: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        Self::DataUri(format!("data:{mime};base64,{encoded}"))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReferenceMedia::Url(s) | ReferenceMedia::DataUri(s) => s,
        }
    }
}

fn mime_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    Ok(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => {
            return Err(GenerationError::configuration(format!(
                "Can't tell the media type of {}",
                path.display()
            )));
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    /// seconds
    pub duration: u32,
    pub aspect_ratio: String,
    pub seed: Option<u32>,
    pub motion_strength: u32,
    pub motion_guidance: u32,
    pub static_camera: bool,
    pub negative_prompt: Option<String>,
    pub watermark: bool,
    /// `None` leaves the provider default in place
    pub interpolate: Option<bool>,
    pub looping: Option<bool>,
    pub image_size: String,
    pub image_quality: String,
    pub image_style: String,
    pub reference: Option<ReferenceMedia>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gen3a".into(),
            duration: MAX_VIDEO_DURATION,
            aspect_ratio: "9:16".into(),
            seed: None,
            motion_strength: 6,
            motion_guidance: 12,
            static_camera: true,
            negative_prompt: None,
            watermark: false,
            interpolate: Some(true),
            looping: Some(false),
            image_size: "1024x1024".into(),
            image_quality: "hd".into(),
            image_style: "vivid".into(),
            reference: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    capability: Capability,
    params: GenerationParams,
}

impl GenerationRequest {
    pub fn new(prompt: String, capability: Capability, params: GenerationParams) -> Self {
        Self {
            prompt,
            capability,
            params,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// The reduced request tried once when the primary submission is refused.
    pub fn narrowed(&self, prompt: String, model: &str) -> Self {
        let params = GenerationParams {
            model: model.to_string(),
            duration: 5,
            aspect_ratio: "9:16".into(),
            seed: None,
            motion_strength: 5,
            motion_guidance: 10,
            static_camera: false,
            negative_prompt: None,
            watermark: false,
            interpolate: None,
            looping: None,
            ..self.params.clone()
        };
        Self {
            prompt,
            capability: self.capability,
            params,
        }
    }
}
