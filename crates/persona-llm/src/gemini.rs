//! Gemini `generateContent` client.

use async_trait::async_trait;
use persona_core::AnalysisError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// --- Named constants ---
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const API_KEY_HEADER: &str = "x-goog-api-key";
/// Substrings the service uses when rejecting a key.
const INVALID_KEY_MARKERS: [&str; 2] = ["API key not valid", "API_KEY_INVALID"];

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable response: {0}")]
    Decode(String),
    #[error("response contained no text")]
    NoContent,
}

impl GeminiError {
    /// True when the service rejected the API key itself.
    pub fn is_invalid_key(&self) -> bool {
        let message = self.to_string();
        INVALID_KEY_MARKERS.iter().any(|m| message.contains(m))
    }
}

impl From<GeminiError> for AnalysisError {
    fn from(err: GeminiError) -> Self {
        if err.is_invalid_key() {
            AnalysisError::InvalidApiKey
        } else {
            AnalysisError::ExternalService(err.to_string())
        }
    }
}

/// One piece of prompt content.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    /// Base64-encoded JPEG.
    Jpeg(String),
}

/// A single-turn request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prompt {
    pub parts: Vec<PromptPart>,
    /// Ask for `application/json` output.
    pub json: bool,
}

impl Prompt {
    pub fn json(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::Text(text.into())],
            json: true,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::Text(text.into())],
            json: false,
        }
    }

    pub fn with_jpeg(mut self, base64: String) -> Self {
        self.parts.push(PromptPart::Jpeg(base64));
        self
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Jpeg(_)))
            .count()
    }
}

/// A generative-language backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run `prompt` and return the response text.
    async fn generate(&self, api_key: &str, prompt: &Prompt) -> Result<String, GeminiError>;
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl From<&Prompt> for GeminiRequest {
    fn from(prompt: &Prompt) -> Self {
        let parts = prompt
            .parts
            .iter()
            .map(|p| match p {
                PromptPart::Text(text) => Part::Text { text: text.clone() },
                PromptPart::Jpeg(data) => Part::Inline {
                    inline_data: InlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: data.clone(),
                    },
                },
            })
            .collect();

        Self {
            contents: vec![Content { parts }],
            generation_config: prompt.json.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        }
    }
}

/// HTTP client for `POST {base}/v1beta/models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, GeminiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &Prompt) -> Result<String, GeminiError> {
        debug!(
            model = %self.model,
            json = prompt.json,
            images = prompt.image_count(),
            "calling generateContent"
        );

        // The key travels in a header so it never appears in URLs or error text.
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&GeminiRequest::from(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generateContent failed");
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Decode(e.to_string()))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GeminiError::NoContent);
        }
        Ok(text)
    }
}
