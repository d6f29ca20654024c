//! Error types for image generation.

use std::time::Duration;

/// Message fragment the Gemini API uses when a model is not visible to the
/// calling key. Premium models answer this way for keys without billing.
pub(crate) const ENTITY_NOT_FOUND: &str = "Requested entity was not found";

/// Errors that can occur while generating images.
#[derive(Debug, thiserror::Error)]
pub enum DreamGenError {
    /// No API key configured. Raised before any request is sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The active key is not entitled to the premium model.
    #[error("PRO_KEY_REQUIRED")]
    ProKeyRequired,

    /// The service answered without any usable image payload.
    #[error("no image produced: {0}")]
    EmptyResult(String),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// API key rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited: {message}{}", retry_hint(.retry_after))]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The external credential flow failed.
    #[error("credential selection failed: {0}")]
    Credential(String),
}

/// Coarse error classes surfaced to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No credential configured.
    Configuration,
    /// Premium request rejected for lack of entitlement.
    ProKeyRequired,
    /// Response without an image.
    EmptyResult,
    /// Anything else coming out of the external call.
    Transport,
}

impl DreamGenError {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ProKeyRequired => ErrorKind::ProKeyRequired,
            Self::EmptyResult(_) | Self::ContentBlocked(_) => ErrorKind::EmptyResult,
            _ => ErrorKind::Transport,
        }
    }

    /// Returns true if the active key lacks premium entitlement.
    pub fn is_pro_key_required(&self) -> bool {
        matches!(self, Self::ProKeyRequired)
    }

    /// Folds an "entity not found" failure into [`DreamGenError::ProKeyRequired`].
    ///
    /// Every other error is returned untouched so its message reaches the user.
    pub fn classify(self) -> Self {
        if self.to_string().contains(ENTITY_NOT_FOUND) {
            Self::ProKeyRequired
        } else {
            self
        }
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

/// Result type alias for image generation operations.
pub type Result<T> = std::result::Result<T, DreamGenError>;

/// Maximum length of an error message carried into [`DreamGenError`].
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Normalizes an error body before it is shown to a user.
///
/// Collapses whitespace, scrubs anything that looks like a Google API key and
/// truncates long bodies.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let scrubbed = collapsed
        .split(' ')
        .map(|word| {
            if word.starts_with("AIza") && word.len() >= 30 {
                "[redacted]"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if scrubbed.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = scrubbed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        scrubbed
    }
}

/// Reads a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            DreamGenError::Configuration("no key".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(DreamGenError::ProKeyRequired.kind(), ErrorKind::ProKeyRequired);
        assert_eq!(
            DreamGenError::EmptyResult("nothing".into()).kind(),
            ErrorKind::EmptyResult
        );
        assert_eq!(
            DreamGenError::ContentBlocked("IMAGE_SAFETY".into()).kind(),
            ErrorKind::EmptyResult
        );
        assert_eq!(
            DreamGenError::RateLimited {
                message: "quota".into(),
                retry_after: None
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            DreamGenError::Api {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_classify_entity_not_found() {
        let err = DreamGenError::Api {
            status: 404,
            message: "Requested entity was not found.".into(),
        };
        assert!(err.classify().is_pro_key_required());
    }

    #[test]
    fn test_classify_keeps_other_errors() {
        let err = DreamGenError::Api {
            status: 404,
            message: "models/foo is not found for API version v1beta".into(),
        };
        let classified = err.classify();
        assert!(!classified.is_pro_key_required());
        assert_eq!(
            classified.to_string(),
            "API error: 404 - models/foo is not found for API version v1beta"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(DreamGenError::ProKeyRequired.to_string(), "PRO_KEY_REQUIRED");

        let err = DreamGenError::RateLimited {
            message: "Quota exceeded".into(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "rate limited: Quota exceeded (retry after 30s)");

        let err = DreamGenError::RateLimited {
            message: "Quota exceeded".into(),
            retry_after: None,
        };
        assert_eq!(err.to_string(), "rate limited: Quota exceeded");

        let err = DreamGenError::ContentBlocked("Safety filter triggered".into());
        assert_eq!(err.to_string(), "content blocked: Safety filter triggered");
    }

    #[test]
    fn test_sanitize_collapses_and_redacts() {
        let text = "bad   key\n AIzaSyA1234567890abcdefghijklmnopqrstu  used";
        assert_eq!(sanitize_error_message(text), "bad key [redacted] used");
    }

    #[test]
    fn test_sanitize_truncates() {
        let text = "x".repeat(MAX_ERROR_MESSAGE_LEN + 10);
        let sanitized = sanitize_error_message(&text);
        assert!(sanitized.ends_with("..."));
        assert_eq!(sanitized.chars().count(), MAX_ERROR_MESSAGE_LEN + 3);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(30));
    }
}
