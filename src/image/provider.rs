//! Image provider trait.

use crate::error::Result;
use crate::image::types::{GeneratedImage, GenerationRequest, QualityTier};
use async_trait::async_trait;

/// Trait for image generation backends.
///
/// One call to [`ImageProvider::generate`] is one request to the remote
/// service. Implementations never retry.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates an image from the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str;

    /// Checks if the model behind `tier` is reachable with the active key.
    async fn health_check(&self, tier: QualityTier) -> Result<()>;
}
