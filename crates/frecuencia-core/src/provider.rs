//! Assistant Provider Strategy
//!
//! Common interface for the AI backend that writes a reply and reads it
//! aloud. The server only talks to this trait, so the text and speech
//! backends can be swapped without touching the handlers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Narrator voice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    Miguel,
    Maria,
}

impl Voice {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Miguel => "Miguel",
            Self::Maria => "Maria",
        }
    }

    /// Parse a voice name. Anything other than `Maria` narrates as `Miguel`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("maria") || s.trim().eq_ignore_ascii_case("maría") {
            Self::Maria
        } else {
            Self::Miguel
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text to be read aloud
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
    /// BCP-47 language code
    #[serde(default = "default_language")]
    pub language_code: String,
}

fn default_language() -> String {
    "es-ES".into()
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
            language_code: default_language(),
        }
    }
}

/// Generated reply with its MP3 rendition
#[derive(Clone, Debug)]
pub struct AssistantReply {
    pub text: String,
    pub audio: Vec<u8>,
}

/// Strategy trait for assistant backends
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    /// Provider name for logs and health output
    fn name(&self) -> &str;

    /// Check if the provider is configured and reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Generate a text reply for the prompt
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    /// Render text as MP3 bytes
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;

    /// Generate a reply and read it aloud.
    ///
    /// An empty generation falls back to the prompt itself so the user still
    /// hears something.
    async fn reply(&self, prompt: &str, voice: Voice) -> Result<AssistantReply> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::InvalidInput("prompt is empty".into()));
        }

        let generated = self.generate_text(prompt).await?;
        let text = if generated.trim().is_empty() {
            prompt.to_string()
        } else {
            generated
        };

        let audio = self.synthesize(&SpeechRequest::new(text.clone(), voice)).await?;
        if audio.is_empty() {
            return Err(CoreError::Provider("speech backend returned no audio".into()));
        }

        Ok(AssistantReply { text, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider {
        generated: &'static str,
    }

    #[async_trait]
    impl AssistantProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate_text(&self, _prompt: &str) -> Result<String> {
            Ok(self.generated.to_string())
        }

        async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
            Ok(request.text.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_reply_uses_generated_text() {
        let provider = EchoProvider { generated: "respira hondo" };
        let reply = provider.reply("estoy nervioso", Voice::Maria).await.unwrap();
        assert_eq!(reply.text, "respira hondo");
        assert_eq!(reply.audio, b"respira hondo");
    }

    #[tokio::test]
    async fn test_empty_generation_falls_back_to_prompt() {
        let provider = EchoProvider { generated: "  " };
        let reply = provider.reply("hola", Voice::Miguel).await.unwrap();
        assert_eq!(reply.text, "hola");
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let provider = EchoProvider { generated: "x" };
        let err = provider.reply("   ", Voice::Miguel).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_voice_parse() {
        assert_eq!(Voice::parse("maria"), Voice::Maria);
        assert_eq!(Voice::parse("Pedro"), Voice::Miguel);
    }
}
