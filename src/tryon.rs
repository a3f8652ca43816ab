use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::codec::EmbeddedImage;
use crate::config::Config;

/// Portrait framing for every generated look.
const ASPECT_RATIO: &str = "3:4";

#[derive(Debug, Error)]
pub enum TryOnError {
    #[error("no image part in upstream response")]
    NoImageReturned,
    #[error("upstream credential missing or rejected")]
    AuthenticationRequired,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// The one external collaborator: given the subject photo, the garment
/// references and an instruction, produce the composited look. Injected
/// into the wizard so tests can substitute a stub.
#[async_trait]
pub trait TryOnService: Send + Sync {
    async fn composite(
        &self,
        subject_photo: &EmbeddedImage,
        garment_mockup: &EmbeddedImage,
        instruction: &str,
        garment_flat_art: Option<&EmbeddedImage>,
    ) -> Result<EmbeddedImage, TryOnError>;
}

pub struct GeminiTryOn {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiTryOn {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl TryOnService for GeminiTryOn {
    async fn composite(
        &self,
        subject_photo: &EmbeddedImage,
        garment_mockup: &EmbeddedImage,
        instruction: &str,
        garment_flat_art: Option<&EmbeddedImage>,
    ) -> Result<EmbeddedImage, TryOnError> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                error!("❌ No upstream credential configured");
                return Err(TryOnError::AuthenticationRequired);
            }
        };

        let request =
            GenerateContentRequest::for_tryon(subject_photo, garment_mockup, instruction, garment_flat_art);
        if let Some(content) = request.contents.first() {
            info!("🧵 Try-on request: {}", describe_parts(&content.parts));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        info!("🔗 Posting to {}", url.replace(api_key, "***"));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TryOnError::UpstreamUnavailable("request timed out".into())
                } else {
                    TryOnError::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_auth_failure(status, &body) {
                error!("❌ Upstream rejected the credential: status={}", status);
                return Err(TryOnError::AuthenticationRequired);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(TryOnError::UpstreamUnavailable("rate limited".into()));
            }
            error!("❌ Upstream error: status={} body={}", status, truncate(&body, 400));
            return Err(TryOnError::UpstreamUnavailable(format!("status={status}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| TryOnError::UpstreamUnavailable(format!("unreadable response: {e}")))?;

        extract_first_image(&parsed).ok_or(TryOnError::NoImageReturned)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Parts go out in a fixed order: subject photo, garment mockup,
    /// instruction text, then flat art when present.
    fn for_tryon(
        subject_photo: &EmbeddedImage,
        garment_mockup: &EmbeddedImage,
        instruction: &str,
        garment_flat_art: Option<&EmbeddedImage>,
    ) -> Self {
        let mut parts = vec![
            Part::inline(subject_photo),
            Part::inline(garment_mockup),
            Part::text(instruction),
        ];
        if let Some(flat_art) = garment_flat_art {
            parts.push(Part::inline(flat_art));
        }
        Self {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".into(), "IMAGE".into()],
                image_config: ImageConfig {
                    aspect_ratio: ASPECT_RATIO.into(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

/// The two part kinds this service ever sends; `Other` tolerates whatever
/// else the endpoint decides to include in a response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    Other(serde_json::Value),
}

impl Part {
    fn inline(image: &EmbeddedImage) -> Self {
        Part::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type().to_string(),
                data: BASE64.encode(image.payload()),
            },
        }
    }

    fn text(text: &str) -> Self {
        Part::Text {
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    #[serde(default)]
    error: Option<UpstreamErrorStatus>,
}

#[derive(Debug, Deserialize, Default)]
struct UpstreamErrorStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Credential failures are recognized by status code and by the structured
/// error kinds in the body, never by matching human-readable messages.
fn is_auth_failure(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return true;
    }
    if let Ok(parsed) = serde_json::from_str::<UpstreamErrorBody>(body) {
        if let Some(err) = parsed.error {
            if err.status == "UNAUTHENTICATED" || err.status == "PERMISSION_DENIED" {
                return true;
            }
            return err
                .details
                .iter()
                .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"));
        }
    }
    false
}

fn extract_first_image(response: &GenerateContentResponse) -> Option<EmbeddedImage> {
    for candidate in &response.candidates {
        for part in &candidate.content.parts {
            match part {
                Part::Inline { inline_data } => match BASE64.decode(inline_data.data.trim()) {
                    Ok(bytes) if !bytes.is_empty() => {
                        info!(
                            "🖼️ Extracted {} image ({} bytes)",
                            inline_data.mime_type,
                            bytes.len()
                        );
                        return Some(EmbeddedImage::new(inline_data.mime_type.clone(), bytes));
                    }
                    _ => {
                        warn!("⚠️ Skipping inline part with undecodable payload");
                    }
                },
                Part::Text { .. } | Part::Other(_) => {}
            }
        }
    }
    info!("⚠️ No inline image data found in response");
    None
}

fn describe_parts(parts: &[Part]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Part::Inline { inline_data } => format!(
                "image {} ({} b64 chars)",
                inline_data.mime_type,
                inline_data.data.len()
            ),
            Part::Text { text } => format!("text ({} chars)", text.len()),
            Part::Other(_) => "other".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
