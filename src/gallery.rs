//! In-session record of generated images, newest first.

use crate::error::Result;
use crate::image::{
    parse_data_url, AspectRatio, GeneratedImage, GenerationMetadata, GenerationSettings,
    ImageFormat,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One successful generation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    id: Uuid,
    image_data: String,
    prompt: String,
    created_at: DateTime<Utc>,
    aspect_ratio: AspectRatio,
    model_label: String,
    settings: GenerationSettings,
    metadata: GenerationMetadata,
}

impl GalleryEntry {
    /// Builds an entry from a generated image and the request that produced it.
    pub fn new(
        id: Uuid,
        created_at: DateTime<Utc>,
        prompt: impl Into<String>,
        settings: GenerationSettings,
        image: &GeneratedImage,
    ) -> Self {
        Self {
            id,
            image_data: image.to_data_url(),
            prompt: prompt.into(),
            created_at,
            aspect_ratio: settings.aspect_ratio,
            model_label: settings.quality_tier.model_label().to_string(),
            settings,
            metadata: image.metadata.clone(),
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The image as a `data:` URL.
    pub fn image_data(&self) -> &str {
        &self.image_data
    }

    /// Prompt the image was generated from.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Aspect ratio requested.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Display name of the model used.
    pub fn model_label(&self) -> &str {
        &self.model_label
    }

    /// Settings in effect when the image was requested.
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Model id and timing reported by the provider.
    pub fn metadata(&self) -> &GenerationMetadata {
        &self.metadata
    }

    /// MIME type declared by the data URL.
    pub fn mime_type(&self) -> Option<&str> {
        parse_data_url(&self.image_data).ok().map(|(mime, _)| mime)
    }

    /// File name used when downloading, e.g. `dreamgen-<id>.png`.
    pub fn download_file_name(&self) -> String {
        let ext = self
            .mime_type()
            .and_then(ImageFormat::from_mime_type)
            .unwrap_or_default()
            .extension();
        format!("dreamgen-{}.{}", self.id, ext)
    }

    /// Decodes the image bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let (_, payload) = parse_data_url(&self.image_data)?;
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| crate::error::DreamGenError::Decode(e.to_string()))
    }

    /// Writes the image into `dir` under [`Self::download_file_name`].
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.download_file_name());
        std::fs::write(&path, self.decode()?)?;
        Ok(path)
    }
}

/// Ordered collection of generations, newest first. Grows only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Gallery {
    entries: VecDeque<GalleryEntry>,
}

impl Gallery {
    /// Creates an empty gallery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry` at the front.
    pub fn push_front(&mut self, entry: GalleryEntry) {
        tracing::info!(id = %entry.id, total = self.entries.len() + 1, "gallery entry added");
        self.entries.push_front(entry);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing has been generated yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&GalleryEntry> {
        self.entries.front()
    }

    /// Entry at `index`, counting from the newest.
    pub fn get(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }

    /// Entry with the given id.
    pub fn find(&self, id: Uuid) -> Option<&GalleryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }
}
