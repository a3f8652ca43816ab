use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to fetch image: {0}")]
    Fetch(String),
    #[error("failed to read image bytes: {0}")]
    Read(String),
    #[error("malformed embedded image: {0}")]
    Malformed(String),
}

/// A self-describing image: mime type plus raw bytes, carried around as a
/// single `data:` URL on the wire. Round-trips exactly through
/// `to_data_url` / `from_data_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    mime_type: String,
    payload: Bytes,
}

impl EmbeddedImage {
    pub fn new(mime_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            payload: payload.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (String, Bytes) {
        (self.mime_type, self.payload)
    }

    pub fn is_png(&self) -> bool {
        self.mime_type == "image/png"
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.payload))
    }

    pub fn from_data_url(url: &str) -> Result<Self, CodecError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| CodecError::Malformed("missing data: scheme".into()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| CodecError::Malformed("missing payload separator".into()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| CodecError::Malformed("only base64 data URLs are supported".into()))?;
        if mime_type.is_empty() {
            return Err(CodecError::Malformed("empty mime type".into()));
        }
        let payload = BASE64
            .decode(data.trim())
            .map_err(|e| CodecError::Malformed(format!("invalid base64 payload: {e}")))?;
        Ok(Self::new(mime_type, payload))
    }
}

/// Encodes user-supplied file bytes, detecting the mime type by sniffing.
/// Only the formats the upload boundary accepts are allowed through.
pub fn encode_bytes(bytes: impl Into<Bytes>) -> Result<EmbeddedImage, CodecError> {
    let bytes = bytes.into();
    if bytes.is_empty() {
        return Err(CodecError::Read("empty image".into()));
    }
    let format = image::guess_format(&bytes)
        .map_err(|e| CodecError::Read(format!("unrecognized image data: {e}")))?;
    match format {
        image::ImageFormat::Png | image::ImageFormat::Jpeg => {
            Ok(EmbeddedImage::new(format.to_mime_type(), bytes))
        }
        other => Err(CodecError::Read(format!(
            "unsupported image format: {other:?}"
        ))),
    }
}

/// Retrieves remote reference images (garment mockups and flat art) and
/// wraps them as embedded images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_and_encode(&self, url: &str) -> Result<EmbeddedImage, CodecError>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_and_encode(&self, url: &str) -> Result<EmbeddedImage, CodecError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CodecError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CodecError::Fetch(format!("status={status} url={url}")));
        }
        let declared_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
            .filter(|v| v.starts_with("image/"));
        let body = response
            .bytes()
            .await
            .map_err(|e| CodecError::Fetch(e.to_string()))?;
        if body.is_empty() {
            return Err(CodecError::Fetch(format!("empty body from {url}")));
        }
        info!("🧺 Fetched asset {} ({} bytes)", url, body.len());
        match declared_mime {
            Some(mime) => Ok(EmbeddedImage::new(mime, body)),
            // GitHub raw serves the right Content-Type, but don't rely on it.
            None => encode_bytes(body),
        }
    }
}
