//! Core types for image generation.

use crate::error::{DreamGenError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Maps a MIME type onto a known format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

/// Aspect ratios offered by the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square.
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 3:4 portrait.
    #[serde(rename = "3:4")]
    Portrait,
    /// 4:3 landscape.
    #[serde(rename = "4:3")]
    Landscape,
    /// 9:16 story.
    #[serde(rename = "9:16")]
    Story,
    /// 16:9 cinematic.
    #[serde(rename = "16:9")]
    Cinematic,
}

impl AspectRatio {
    /// All ratios, in picker order.
    pub const ALL: [AspectRatio; 5] = [
        Self::Square,
        Self::Portrait,
        Self::Landscape,
        Self::Story,
        Self::Cinematic,
    ];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "3:4",
            Self::Landscape => "4:3",
            Self::Story => "9:16",
            Self::Cinematic => "16:9",
        }
    }

    /// Human readable label for pickers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Square => "Square (1:1)",
            Self::Portrait => "Portrait (3:4)",
            Self::Landscape => "Landscape (4:3)",
            Self::Story => "Story (9:16)",
            Self::Cinematic => "Cinematic (16:9)",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = DreamGenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| DreamGenError::InvalidRequest(format!("unknown aspect ratio: {s}")))
    }
}

/// Model quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Gemini 2.5 Flash Image.
    #[default]
    Standard,
    /// Gemini 3 Pro Image. Needs a billing-enabled key.
    Premium,
}

impl QualityTier {
    /// Returns the API model identifier for this tier.
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Standard => "gemini-2.5-flash-image",
            Self::Premium => "gemini-3-pro-image-preview",
        }
    }

    /// Model name recorded on gallery entries.
    pub fn model_label(&self) -> &'static str {
        match self {
            Self::Standard => "Gemini 2.5 Flash",
            Self::Premium => "Gemini 3 Pro",
        }
    }

    /// Label for the engine toggle.
    pub fn engine_label(&self) -> &'static str {
        match self {
            Self::Standard => "Flash Engine (2.5)",
            Self::Premium => "Pro Engine (3.0)",
        }
    }

    /// Returns true for the premium tier.
    pub fn is_premium(&self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Output resolution. Only the premium model accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionTier {
    /// 1K output.
    #[default]
    #[serde(rename = "1K")]
    OneK,
    /// 2K output.
    #[serde(rename = "2K")]
    TwoK,
    /// 4K output.
    #[serde(rename = "4K")]
    FourK,
}

impl ResolutionTier {
    /// All tiers, smallest first.
    pub const ALL: [ResolutionTier; 3] = [Self::OneK, Self::TwoK, Self::FourK];

    /// Returns the wire value (e.g., "2K").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResolutionTier {
    type Err = DreamGenError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == wanted)
            .ok_or_else(|| DreamGenError::InvalidRequest(format!("unknown resolution: {s}")))
    }
}

/// User-adjustable display settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Output aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// Model tier.
    pub quality_tier: QualityTier,
    /// Stored resolution. Ignored unless the tier is premium.
    pub resolution_tier: ResolutionTier,
}

impl GenerationSettings {
    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the quality tier.
    pub fn with_quality_tier(mut self, tier: QualityTier) -> Self {
        self.quality_tier = tier;
        self
    }

    /// Sets the resolution tier.
    pub fn with_resolution_tier(mut self, tier: ResolutionTier) -> Self {
        self.resolution_tier = tier;
        self
    }

    /// Resolution that should be transmitted, if any.
    pub fn effective_resolution(&self) -> Option<ResolutionTier> {
        self.quality_tier
            .is_premium()
            .then_some(self.resolution_tier)
    }
}

/// A request to generate an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Settings captured at submission time.
    pub settings: GenerationSettings,
}

impl GenerationRequest {
    /// Creates a new request with the given prompt and default settings.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            settings: GenerationSettings::default(),
        }
    }

    /// Replaces the settings.
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns true if the prompt has visible content.
    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A generated image: MIME type plus base64 payload, as returned by the API.
#[derive(Debug, Clone)]
#[must_use = "generated image should be stored or displayed"]
pub struct GeneratedImage {
    /// Declared MIME type (e.g., "image/png").
    pub mime_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(
        mime_type: impl Into<String>,
        data: impl Into<String>,
        metadata: GenerationMetadata,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            metadata,
        }
    }

    /// Format matching the declared MIME type, if it is one we know.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime_type)
    }

    /// Decodes the payload.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| DreamGenError::Decode(e.to_string()))
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Splits a `data:<mime>;base64,<payload>` URL into its parts.
pub fn parse_data_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| DreamGenError::Decode("not a data URL".into()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| DreamGenError::Decode("data URL is not base64 encoded".into()))?;
    Ok((mime, payload))
}
