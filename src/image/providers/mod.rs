//! Image generation providers.

#[cfg(feature = "gemini-image")]
mod gemini;

#[cfg(feature = "gemini-image")]
pub use gemini::{GeminiProvider, GeminiProviderBuilder, BASE_URL_ENV_VAR, DEFAULT_BASE_URL};
