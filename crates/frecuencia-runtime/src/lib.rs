//! # frecuencia-runtime
//!
//! Runtime providers for the Frecuencia assistant.
//!
//! ## Providers
//!
//! - **Gemini** (default): text generation with Gemini, speech with Google
//!   Cloud Text-to-Speech
//!
//! ## Usage
//!
//! ```rust,ignore
//! use frecuencia_runtime::{AudioClipStore, GeminiProvider};
//!
//! let provider = GeminiProvider::from_env()?;
//! let reply = provider.reply("no puedo dormir", Voice::Maria).await?;
//! let url = AudioClipStore::new("public").save(&reply.audio).await?;
//! ```

pub mod clips;
#[cfg(feature = "gemini")]
pub mod gemini;

pub use clips::AudioClipStore;
#[cfg(feature = "gemini")]
pub use gemini::{GeminiConfig, GeminiProvider};

// Re-export core types for convenience
pub use frecuencia_core::{AssistantProvider, CoreError, Result, SpeechRequest, Voice};
