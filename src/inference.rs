use std::io::Cursor;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::models::GeneratedImage;

pub const DEFAULT_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-2";

/// Used when the service declares no content type and the bytes are not a recognised format.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Placeholder base colours, picked by prompt hash.
const PALETTE: [[u8; 3]; 5] = [
    [0x3B, 0x82, 0xF6],
    [0xEF, 0x44, 0x44],
    [0x10, 0xB9, 0x81],
    [0xF5, 0x9E, 0x0B],
    [0x8B, 0x5C, 0xF6],
];

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("inference service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference service returned an empty body")]
    EmptyBody,
    #[error("placeholder rendering failed: {0}")]
    Render(String),
}

/// Turns a text prompt into image bytes.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, InferenceError>;
}

/// Hugging Face hosted inference for a text-to-image model.
///
/// A single attempt is made per call. The request asks the service to wait for a
/// cold model instead of answering 503 while it loads, so no client timeout is set.
pub struct HuggingFaceClient {
    client: Client,
    api_key: String,
    model_url: String,
}

impl HuggingFaceClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_url: DEFAULT_MODEL_URL.to_string(),
        }
    }

    pub fn with_model_url(mut self, model_url: impl Into<String>) -> Self {
        self.model_url = model_url.into();
        self
    }
}

#[async_trait]
impl ImageGenerator for HuggingFaceClient {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, InferenceError> {
        info!("🔗 Requesting image from {}", self.model_url);

        let request_body = json!({
            "inputs": prompt,
            "options": { "wait_for_model": true }
        });

        let response = self
            .client
            .post(&self.model_url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Inference response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Inference API error response: {}", body);
            return Err(InferenceError::Status { status: status.as_u16(), body });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        if bytes.is_empty() {
            return Err(InferenceError::EmptyBody);
        }

        let mime_type = declared.unwrap_or_else(|| sniff_mime_type(&bytes).to_string());
        info!("🖼️ Received {} image ({} bytes)", mime_type, bytes.len());
        Ok(GeneratedImage::new(bytes, mime_type))
    }
}

/// Best-effort MIME detection from magic bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Offline generator that renders a gradient PNG tinted by the prompt.
///
/// Selected at startup when no inference token is configured. It is never used to
/// paper over a failed remote call.
pub struct PlaceholderGenerator {
    width: u32,
    height: u32,
}

impl Default for PlaceholderGenerator {
    fn default() -> Self {
        Self { width: 512, height: 512 }
    }
}

impl PlaceholderGenerator {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn base_color(prompt: &str) -> [u8; 3] {
        let hash = prompt
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        PALETTE[(hash as usize) % PALETTE.len()]
    }

    fn render(&self, prompt: &str) -> Result<Vec<u8>, InferenceError> {
        let [r, g, b] = Self::base_color(prompt);
        let (w, h) = (self.width.max(1), self.height.max(1));
        let img = image::RgbImage::from_fn(w, h, |x, y| {
            // diagonal fade towards 60% intensity
            let t = (x + y) as f32 / (w + h) as f32;
            let shade = |c: u8| (c as f32 * (1.0 - 0.4 * t)) as u8;
            image::Rgb([shade(r), shade(g), shade(b)])
        });

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| InferenceError::Render(e.to_string()))?;
        Ok(out.into_inner())
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, InferenceError> {
        info!("Using demo mode - rendering placeholder image");
        let png = self.render(prompt)?;
        info!("📦 Generated placeholder image ({} bytes)", png.len());
        Ok(GeneratedImage::new(png, "image/png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_is_a_png_and_stable_per_prompt() {
        let generator = PlaceholderGenerator::with_size(16, 16);
        let a = generator.generate("a red bicycle").await.unwrap();
        let b = generator.generate("a red bicycle").await.unwrap();
        assert_eq!(a.mime_type, "image/png");
        assert_eq!(sniff_mime_type(&a.bytes), "image/png");
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_bytes_fall_back_to_jpeg() {
        assert_eq!(sniff_mime_type(b"definitely not an image"), DEFAULT_MIME_TYPE);
        assert_eq!(sniff_mime_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]), "image/png");
    }

    #[test]
    fn base_color_comes_from_palette() {
        for prompt in ["", "a red bicycle", "a blue boat", "🚲"] {
            assert!(PALETTE.contains(&PlaceholderGenerator::base_color(prompt)));
        }
        assert_eq!(PlaceholderGenerator::base_color(""), PALETTE[0]);
    }
}
