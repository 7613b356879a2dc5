//! Clients for the hosted text-generation and speech-synthesis services.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{GenerationConfig, SpeechConfig};
use crate::error::{AssistantError, Result};

/// Produces free text from a prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Renders text as audio
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Audio bytes, or `None` when synthesis failed
    async fn synthesize(&self, text: &str, language_code: &str) -> Option<Vec<u8>>;
}

fn map_transport_error(service: &str, timeout_secs: u64, e: reqwest::Error) -> AssistantError {
    if e.is_connect() {
        AssistantError::External(format!("cannot reach {service}"))
    } else if e.is_timeout() {
        AssistantError::External(format!("{service} timed out after {timeout_secs}s"))
    } else {
        AssistantError::Http(e)
    }
}

/// Request body for `models/{model}:generateContent`
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiClient {
    /// Build a client from explicit configuration
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AssistantError::External("text generation API key is not configured".to_string()));
        }

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("text generation service", self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::External(format!(
                "text generation returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AssistantError::External("text generation returned no content".to_string()));
        }

        debug!(model = %self.model, chars = text.len(), "Generated text");
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    ssml_gender: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Google Cloud Text-to-Speech client
pub struct GoogleTtsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl GoogleTtsClient {
    /// Build a client from explicit configuration
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn request_audio(&self, text: &str, language_code: &str) -> Result<Vec<u8>> {
        if self.api_key.is_empty() {
            return Err(AssistantError::External("speech API key is not configured".to_string()));
        }

        let url = format!("{}/v1/text:synthesize", self.base_url);
        let body = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code,
                ssml_gender: "NEUTRAL",
            },
            audio_config: AudioConfig { audio_encoding: "MP3" },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("speech service", self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::External(format!("speech synthesis returned {}", status.as_u16())));
        }

        let parsed: SynthesizeResponse = response.json().await?;
        STANDARD
            .decode(parsed.audio_content)
            .map_err(|e| AssistantError::External(format!("speech audio is not valid base64: {e}")))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsClient {
    async fn synthesize(&self, text: &str, language_code: &str) -> Option<Vec<u8>> {
        match self.request_audio(text, language_code).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!(language_code, error = %e, "Speech synthesis failed");
                None
            },
        }
    }
}
