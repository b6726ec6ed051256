//! Gemini Assistant Provider
//!
//! Implementation of `AssistantProvider` backed by the Gemini
//! `generateContent` endpoint and Google Cloud Text-to-Speech.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use frecuencia_core::{
    error::{CoreError, Result},
    provider::{AssistantProvider, SpeechRequest, Voice},
};

/// Gemini provider configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key shared by Gemini and Cloud TTS
    pub api_key: String,

    /// Generation model
    pub model: String,

    /// Gemini API base URL
    pub api_base: String,

    /// Text-to-Speech base URL
    pub tts_base: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-1.5-flash-latest".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            tts_base: "https://texttospeech.googleapis.com/v1".into(),
            timeout_secs: 60,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| CoreError::Config("GEMINI_API_KEY not set".into()))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(timeout) = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
        {
            config.timeout_secs = timeout;
        }
        Ok(config)
    }
}

// Wire types

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
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
    name: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

/// Cloud TTS voice for a narrator
const fn voice_name(voice: Voice) -> &'static str {
    match voice {
        Voice::Maria => "es-ES-Standard-A",
        Voice::Miguel => "es-ES-Standard-B",
    }
}

/// Gemini + Cloud TTS provider
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(GeminiConfig::from_env()?)
    }

    pub const fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn post_json<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
        what: &str,
    ) -> Result<R> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::ProviderUnavailable(format!("{what}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            tracing::error!(%status, %details, "{what} request failed");
            return Err(CoreError::Provider(format!("{what} returned {status}: {details}")));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| CoreError::Provider(format!("{what} response: {e}")))
    }
}

#[async_trait]
impl AssistantProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn health_check(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        );
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };

        let response: GenerateResponse = self.post_json(&url, &body, "Gemini").await?;
        Ok(response.first_text().unwrap_or_default())
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let url = format!("{}/text:synthesize", self.config.tts_base);
        let body = SynthesizeRequest {
            input: SynthesisInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &request.language_code,
                name: voice_name(request.voice),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };

        let response: SynthesizeResponse = self.post_json(&url, &body, "Text-to-Speech").await?;
        let encoded = response
            .audio_content
            .filter(|a| !a.is_empty())
            .ok_or_else(|| CoreError::Provider("no audio received from TTS".into()))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::Provider(format!("invalid TTS audio: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GeminiConfig::new("key");
        assert_eq!(config.model, "gemini-1.5-flash-latest");
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_voice_mapping() {
        assert_eq!(voice_name(Voice::Maria), "es-ES-Standard-A");
        assert_eq!(voice_name(Voice::Miguel), "es-ES-Standard-B");
    }

    #[test]
    fn test_first_text_extraction() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Respira."}, {"text": "ignored"}]}}]
        }))
        .unwrap();
        assert_eq!(response.first_text().as_deref(), Some("Respira."));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.first_text().is_none());
    }

    #[test]
    fn test_synthesize_body_shape() {
        let body = SynthesizeRequest {
            input: SynthesisInput { text: "hola" },
            voice: VoiceSelection {
                language_code: "es-ES",
                name: voice_name(Voice::Maria),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["voice"]["languageCode"], "es-ES");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
    }
}
