#![warn(missing_docs)]
//! DreamGen - prompt-to-image studio backed by Gemini image models.
//!
//! The crate collects a prompt and display settings, sends one request per
//! submission to the image service and keeps the results in an in-session
//! gallery. The premium tier is guarded by a credential gate.
//!
//! # Quick Start
//!
//! ```no_run
//! use dreamgen::{
//!     CredentialGate, CredentialSlot, GeminiProvider, SlotSelector, Studio, Submission,
//! };
//!
//! #[tokio::main]
//! async fn main() -> dreamgen::Result<()> {
//!     let slot = CredentialSlot::from_env();
//!     let provider = GeminiProvider::builder().credentials(slot.clone()).build()?;
//!     let mut studio = Studio::new(provider, CredentialGate::new(SlotSelector::new(slot)));
//!
//!     if let Submission::Generated(id) = studio.generate("a red fox in snow").await {
//!         let entry = studio.session().gallery().find(id).expect("just added");
//!         entry.save(".")?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini-image`: Gemini (Google) generation client
//! - `cli`: terminal front-end

mod error;

pub mod credential;
pub mod gallery;
pub mod image;
pub mod session;

pub use error::{DreamGenError, ErrorKind, Result};

pub use credential::{
    ActivationPolicy, CredentialGate, CredentialSelector, CredentialSlot, PremiumToggle,
    SlotSelector,
};
pub use gallery::{Gallery, GalleryEntry};
pub use image::{
    AspectRatio, GeneratedImage, GenerationMetadata, GenerationRequest, GenerationSettings,
    ImageFormat, ImageProvider, QualityTier, ResolutionTier,
};
pub use session::{Effect, Event, Phase, Session, Studio, Submission};

#[cfg(feature = "gemini-image")]
pub use image::providers::{GeminiProvider, GeminiProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::credential::{CredentialGate, CredentialSelector, CredentialSlot};
    pub use crate::error::{DreamGenError, Result};
    pub use crate::image::{GenerationRequest, GenerationSettings, ImageProvider};
    pub use crate::session::{Session, Studio, Submission};

    #[cfg(feature = "gemini-image")]
    pub use crate::image::providers::GeminiProvider;
}
