//! Gemini (Google) image generation provider.

use crate::credential::CredentialSlot;
use crate::error::{parse_retry_after, sanitize_error_message, DreamGenError, Result};
use crate::image::provider::ImageProvider;
use crate::image::types::{GeneratedImage, GenerationMetadata, GenerationRequest, QualityTier};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV_VAR: &str = "DREAMGEN_BASE_URL";

/// Builder for GeminiProvider.
#[derive(Debug, Clone, Default)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    credentials: Option<CredentialSlot>,
    base_url: Option<String>,
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a fixed API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Shares a credential slot with a selection flow.
    ///
    /// Without one, the slot is seeded from `GOOGLE_API_KEY` / `API_KEY`.
    pub fn credentials(mut self, slot: CredentialSlot) -> Self {
        self.credentials = Some(slot);
        self
    }

    /// Overrides the API base URL. Falls back to `DREAMGEN_BASE_URL`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the provider.
    ///
    /// A missing key is not an error here; it is reported on the first
    /// generation, before any request is sent.
    pub fn build(self) -> Result<GeminiProvider> {
        let credentials = self.credentials.unwrap_or_else(CredentialSlot::from_env);
        if let Some(key) = self.api_key {
            credentials.set(key);
        }

        let base_url = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(DreamGenError::Configuration(format!(
                "base URL must be http(s): {base_url}"
            )));
        }

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            credentials,
            base_url,
        })
    }
}

/// Gemini image generation provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    credentials: CredentialSlot,
    base_url: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    /// The credential slot read on every call.
    pub fn credentials(&self) -> &CredentialSlot {
        &self.credentials
    }

    fn model_url(&self, tier: QualityTier) -> String {
        format!("{}/v1beta/models/{}", self.base_url, tier.model_id())
    }

    fn api_key(&self) -> Result<String> {
        self.credentials.get().ok_or_else(|| {
            DreamGenError::Configuration("API key is not configured.".into())
        })
    }

    async fn generate_impl(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let api_key = self.api_key()?;
        if !request.has_prompt() {
            return Err(DreamGenError::InvalidRequest("prompt is empty".into()));
        }

        let start = Instant::now();
        let tier = request.settings.quality_tier;
        let url = format!("{}:generateContent", self.model_url(tier));
        let body = GeminiRequest::from_generation_request(request);

        tracing::debug!(
            model = tier.model_id(),
            aspect_ratio = %request.settings.aspect_ratio,
            image_size = ?body.generation_config.image_config.image_size,
            "submitting Gemini image generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let inline_data = gemini_response.into_inline_data()?;

        // Reject payloads that are not valid base64 before they reach the gallery.
        base64::engine::general_purpose::STANDARD
            .decode(&inline_data.data)
            .map_err(|e| DreamGenError::Decode(e.to_string()))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(duration_ms, mime_type = %inline_data.mime_type, "Gemini image generation complete");

        Ok(GeneratedImage::new(
            inline_data.mime_type,
            inline_data.data,
            GenerationMetadata {
                model: Some(tier.model_id().to_string()),
                duration_ms: Some(duration_ms),
            },
        ))
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> DreamGenError {
    let message = serde_json::from_str::<GeminiErrorEnvelope>(text)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| text.to_string());
    let message = sanitize_error_message(&message);

    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return DreamGenError::RateLimited {
            message,
            retry_after,
        };
    }
    if status == 401 || status == 403 {
        return DreamGenError::Auth(message);
    }
    DreamGenError::Api { status, message }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        self.generate_impl(request).await.map_err(|e| {
            let e = e.classify();
            if !e.is_pro_key_required() {
                tracing::error!(error = %e, "Gemini image generation error");
            }
            e
        })
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self, tier: QualityTier) -> Result<()> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(self.model_url(tier))
            .header("x-goog-api-key", &api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        Err(parse_error(status.as_u16(), &text, &headers).classify())
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    image_config: GeminiImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    aspect_ratio: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<&'static str>,
}

impl GeminiRequest {
    fn from_generation_request(req: &GenerationRequest) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiTextPart {
                    text: req.prompt.clone(),
                }],
            }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
                image_config: GeminiImageConfig {
                    aspect_ratio: req.settings.aspect_ratio.as_str(),
                    image_size: req.settings.effective_resolution().map(|r| r.as_str()),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GeminiResponse {
    /// Picks the first inline-data part of the first candidate.
    fn into_inline_data(self) -> Result<InlineData> {
        // Blocks are reported with HTTP 200
        if let Some(feedback) = self.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .unwrap_or_else(|| format!("Prompt blocked: {reason}"));
                return Err(DreamGenError::ContentBlocked(msg));
            }
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| DreamGenError::EmptyResult("No image generated.".into()))?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    return Err(DreamGenError::ContentBlocked(format!(
                        "Content blocked by Gemini safety filter: {finish_reason}"
                    )));
                }
                _ => {}
            }
        }

        candidate
            .content
            .into_iter()
            .flat_map(|content| content.parts)
            .find_map(|part| part.inline_data)
            .ok_or_else(|| {
                DreamGenError::EmptyResult("No image data found in the response parts.".into())
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::types::{AspectRatio, GenerationSettings, ResolutionTier};

    fn premium_4k() -> GenerationSettings {
        GenerationSettings::default()
            .with_quality_tier(QualityTier::Premium)
            .with_resolution_tier(ResolutionTier::FourK)
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = GeminiProviderBuilder::new()
            .api_key("test-key")
            .base_url("https://example.test/")
            .build()
            .unwrap();
        assert_eq!(provider.credentials().get().as_deref(), Some("test-key"));
        assert_eq!(
            provider.model_url(QualityTier::Premium),
            "https://example.test/v1beta/models/gemini-3-pro-image-preview"
        );
    }

    #[test]
    fn test_builder_rejects_bad_base_url() {
        let result = GeminiProviderBuilder::new()
            .api_key("k")
            .base_url("ftp://example.test")
            .build();
        assert!(matches!(result, Err(DreamGenError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        // Unroutable base URL: reaching the network would yield a Network error instead.
        let provider = GeminiProviderBuilder::new()
            .credentials(CredentialSlot::empty())
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();

        let err = provider
            .generate(&GenerationRequest::new("a red fox in snow"))
            .await
            .unwrap_err();
        assert!(matches!(err, DreamGenError::Configuration(_)));
    }

    #[test]
    fn test_request_standard_omits_image_size() {
        let req = GenerationRequest::new("a red fox in snow").with_settings(
            GenerationSettings::default().with_resolution_tier(ResolutionTier::FourK),
        );
        let json = serde_json::to_value(GeminiRequest::from_generation_request(&req)).unwrap();

        let image_config = &json["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], "1:1");
        assert!(image_config.get("imageSize").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "a red fox in snow");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
    }

    #[test]
    fn test_request_premium_carries_image_size() {
        let req = GenerationRequest::new("a red fox in snow")
            .with_settings(premium_4k().with_aspect_ratio(AspectRatio::Cinematic));
        let json = serde_json::to_value(GeminiRequest::from_generation_request(&req)).unwrap();

        let image_config = &json["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], "16:9");
        assert_eq!(image_config["imageSize"], "4K");
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let req = GenerationRequest::new("A puppy");
        let json = serde_json::to_value(GeminiRequest::from_generation_request(&req)).unwrap();

        assert!(json.get("generationConfig").is_some());
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_response_first_inline_part_wins() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "here you go"},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "/9j/4AAQ"}},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let inline = resp.into_inline_data().unwrap();
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(inline.data, "/9j/4AAQ");
    }

    #[test]
    fn test_response_without_candidates() {
        let resp: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let err = resp.into_inline_data().unwrap_err();
        assert!(matches!(err, DreamGenError::EmptyResult(_)));
    }

    #[test]
    fn test_response_without_inline_data() {
        let json = r#"{"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]}"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_inline_data().unwrap_err();
        assert!(matches!(err, DreamGenError::EmptyResult(_)));
    }

    #[test]
    fn test_response_with_prompt_feedback_block() {
        let json = r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        match resp.into_inline_data() {
            Err(DreamGenError::ContentBlocked(msg)) => {
                assert_eq!(msg, "Prompt was blocked due to safety")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_response_safety_finish_reason() {
        let json = r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.into_inline_data(),
            Err(DreamGenError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_parse_error_entity_not_found_classifies_as_pro_key() {
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;
        let err = parse_error(404, body, &reqwest::header::HeaderMap::new());
        assert!(matches!(err, DreamGenError::Api { status: 404, .. }));
        assert!(err.classify().is_pro_key_required());
    }

    #[test]
    fn test_parse_error_keeps_message() {
        let body = r#"{"error": {"code": 500, "message": "Internal error encountered."}}"#;
        let err = parse_error(500, body, &reqwest::header::HeaderMap::new()).classify();
        assert_eq!(err.to_string(), "API error: 500 - Internal error encountered.");
    }

    #[test]
    fn test_parse_error_status_mapping() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        match parse_error(429, r#"{"error": {"message": "Quota exceeded"}}"#, &headers) {
            DreamGenError::RateLimited {
                message,
                retry_after: Some(d),
            } => {
                assert_eq!(message, "Quota exceeded");
                assert_eq!(d.as_secs(), 12);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            parse_error(403, "API key not valid", &reqwest::header::HeaderMap::new()),
            DreamGenError::Auth(_)
        ));
        assert!(matches!(
            parse_error(400, "plain text body", &reqwest::header::HeaderMap::new()),
            DreamGenError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_parse_error_blocked_wording_stays_api_error() {
        let body = r#"{"error": {"message": "API key blocked for this project"}}"#;
        let err = parse_error(400, body, &reqwest::header::HeaderMap::new());
        assert_eq!(err.to_string(), "API error: 400 - API key blocked for this project");
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }

    /// Serves one canned HTTP response on a loopback port and returns its base URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Drain the request so the client never sees a reset.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}")
    }

    fn provider_at(base_url: String) -> GeminiProvider {
        GeminiProviderBuilder::new()
            .credentials(CredentialSlot::with_key("test-key"))
            .base_url(base_url)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_entity_not_found_is_pro_key_required() {
        let base_url = serve_once(
            "404 Not Found",
            r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#,
        )
        .await;
        let request = GenerationRequest::new("a red fox in snow").with_settings(premium_4k());

        let err = provider_at(base_url).generate(&request).await.unwrap_err();

        assert!(err.is_pro_key_required());
        assert_eq!(err.kind(), crate::error::ErrorKind::ProKeyRequired);
    }

    #[tokio::test]
    async fn test_generate_returns_data_url() {
        let base_url = serve_once(
            "200 OK",
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}]}, "finishReason": "STOP"}]}"#,
        )
        .await;

        let image = provider_at(base_url)
            .generate(&GenerationRequest::new("a red fox in snow"))
            .await
            .unwrap();

        assert_eq!(image.to_data_url(), "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(image.metadata.model.as_deref(), Some("gemini-2.5-flash-image"));
        assert!(image.metadata.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_generate_rejects_invalid_base64() {
        let base_url = serve_once(
            "200 OK",
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "%%%not-base64"}}]}}]}"#,
        )
        .await;

        let err = provider_at(base_url)
            .generate(&GenerationRequest::new("fox"))
            .await
            .unwrap_err();

        assert!(matches!(err, DreamGenError::Decode(_)));
    }

    #[tokio::test]
    async fn test_generate_rate_limited_keeps_quota_message() {
        let base_url = serve_once(
            "429 Too Many Requests",
            r#"{"error": {"code": 429, "message": "Quota exceeded for metric generate_content_free_tier_requests"}}"#,
        )
        .await;

        let err = provider_at(base_url)
            .generate(&GenerationRequest::new("fox"))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "rate limited: Quota exceeded for metric generate_content_free_tier_requests"
        );
    }

    #[tokio::test]
    async fn test_health_check_failure() {
        let base_url = serve_once(
            "403 Forbidden",
            r#"{"error": {"code": 403, "message": "API key not valid. Please pass a valid API key."}}"#,
        )
        .await;

        let err = provider_at(base_url)
            .health_check(QualityTier::Standard)
            .await
            .unwrap_err();

        assert!(matches!(err, DreamGenError::Auth(ref m) if m.starts_with("API key not valid")));
    }

    #[tokio::test]
    async fn test_health_check_entity_not_found_is_pro_key_required() {
        let base_url = serve_once(
            "404 Not Found",
            r#"{"error": {"code": 404, "message": "Requested entity was not found."}}"#,
        )
        .await;

        let err = provider_at(base_url)
            .health_check(QualityTier::Premium)
            .await
            .unwrap_err();

        assert!(err.is_pro_key_required());
    }
}
