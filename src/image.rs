use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Upstream image generation. `generate` is pure text-to-image; `edit` takes
/// the prior frame's raw bytes and returns a new frame building on it.
/// Both return raw PNG bytes. Retry and timeout policy live in the caller.
#[async_trait]
pub trait ImageClient: Send + Sync + Debug {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
    async fn edit(&self, image: &[u8], prompt: &str) -> Result<Vec<u8>>;
}

pub fn create_image_client(config: &Config, http: reqwest::Client) -> Result<Arc<dyn ImageClient>> {
    match config.image.provider.as_str() {
        "gemini" => {
            let cfg = config
                .image
                .gemini
                .as_ref()
                .context("Gemini image config missing")?;
            Ok(Arc::new(GeminiImageClient::new(&cfg.api_key, &cfg.model, http)))
        }
        "openai" => {
            let cfg = config
                .image
                .openai
                .as_ref()
                .context("OpenAI image config missing")?;
            Ok(Arc::new(OpenAIImageClient::new(
                &cfg.api_key,
                &cfg.model,
                cfg.base_url.as_deref(),
                http,
            )))
        }
        other => Err(anyhow!("Unknown image provider: {}", other)),
    }
}

// --- Gemini ---

#[derive(Debug)]
struct GeminiImageClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiImageClient {
    fn new(api_key: &str, model: &str, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }

    async fn generate_content(&self, parts: Vec<GeminiImagePart>) -> Result<Vec<u8>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = GeminiImageRequest {
            contents: vec![GeminiImageContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GeminiGenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini image API error: {}", error_text));
        }

        let body = resp.text().await?;
        extract_gemini_image(&body)
    }
}

#[derive(Serialize)]
struct GeminiImageRequest {
    contents: Vec<GeminiImageContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiImageContent {
    role: String,
    parts: Vec<GeminiImagePart>,
}

#[derive(Serialize)]
struct GeminiImagePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Serialize, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<String>,
}

#[derive(Deserialize)]
struct GeminiImageResponse {
    candidates: Option<Vec<GeminiImageCandidate>>,
    error: Option<GeminiImageError>,
}

#[derive(Deserialize)]
struct GeminiImageCandidate {
    content: Option<GeminiImageContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiImageContentResponse {
    #[serde(default)]
    parts: Vec<GeminiImagePartResponse>,
}

#[derive(Deserialize)]
struct GeminiImagePartResponse {
    #[serde(rename = "inlineData")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Deserialize, Debug)]
struct GeminiImageError {
    message: String,
}

/// Image-bearing responses interleave text and image parts; take the first
/// part that actually carries inline data.
fn extract_gemini_image(body: &str) -> Result<Vec<u8>> {
    let result: GeminiImageResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Failed to parse Gemini image response: {}", e))?;

    if let Some(err) = result.error {
        return Err(anyhow!("Gemini image API returned error: {}", err.message));
    }

    if let Some(candidates) = result.candidates {
        if let Some(first) = candidates.first() {
            if let Some(content) = &first.content {
                for part in &content.parts {
                    if let Some(inline) = &part.inline_data {
                        let bytes = BASE64
                            .decode(&inline.data)
                            .context("Gemini inline image data is not valid base64")?;
                        return Ok(bytes);
                    }
                }
            }

            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            return Err(anyhow!(
                "Gemini response carried no image. Finish reason: {}",
                reason
            ));
        }
    }

    Err(anyhow!("Gemini image response unexpected or empty"))
}

#[async_trait]
impl ImageClient for GeminiImageClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        self.generate_content(vec![GeminiImagePart {
            text: Some(prompt.to_string()),
            inline_data: None,
        }])
        .await
    }

    async fn edit(&self, image: &[u8], prompt: &str) -> Result<Vec<u8>> {
        // Prior frame first, instruction second.
        self.generate_content(vec![
            GeminiImagePart {
                text: None,
                inline_data: Some(GeminiInlineData {
                    mime_type: "image/png".to_string(),
                    data: BASE64.encode(image),
                }),
            },
            GeminiImagePart {
                text: Some(prompt.to_string()),
                inline_data: None,
            },
        ])
        .await
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIImageClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIImageClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OpenAIGenerationRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct OpenAIImageResponse {
    data: Vec<OpenAIImageData>,
}

#[derive(Deserialize)]
struct OpenAIImageData {
    b64_json: Option<String>,
}

fn extract_openai_image(body: &str) -> Result<Vec<u8>> {
    let result: OpenAIImageResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Failed to parse OpenAI image response: {}", e))?;

    let first = result
        .data
        .first()
        .ok_or_else(|| anyhow!("OpenAI image response carried no data"))?;
    let b64 = first
        .b64_json
        .as_ref()
        .ok_or_else(|| anyhow!("OpenAI image response missing b64_json payload"))?;

    let bytes = BASE64
        .decode(b64)
        .context("OpenAI image data is not valid base64")?;
    Ok(bytes)
}

#[async_trait]
impl ImageClient for OpenAIImageClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let url = format!("{}/images/generations", self.base_url);

        let request_body = OpenAIGenerationRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI image API error: {}", error_text));
        }

        let body = resp.text().await?;
        extract_openai_image(&body)
    }

    async fn edit(&self, image: &[u8], prompt: &str) -> Result<Vec<u8>> {
        let url = format!("{}/images/edits", self.base_url);

        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("previous.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt.to_string())
            .part("image", part);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI image edit API error: {}", error_text));
        }

        let body = resp.text().await?;
        extract_openai_image(&body)
    }
}
