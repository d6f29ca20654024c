//! Image generation module.

mod provider;
pub mod providers;
mod types;

pub use provider::ImageProvider;
pub use types::{
    parse_data_url, AspectRatio, GeneratedImage, GenerationMetadata, GenerationRequest,
    GenerationSettings, ImageFormat, QualityTier, ResolutionTier,
};
