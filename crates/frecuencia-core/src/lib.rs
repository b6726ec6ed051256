//! # frecuencia-core
//!
//! Domain logic for the Frecuencia wellness sessions: what a user hears for a
//! given mood, how long a session runs, and who may start a free trial.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionController                        │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │    Mood     │  │ EmotionClassifier│  │    AudioSink    │  │
//! │  │   catalog   │──│   (rule table)   │──│   (Strategy)    │  │
//! │  └─────────────┘  └──────────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `AssistantProvider` trait keeps the AI text/voice backend swappable
//! without touching the session flow.

pub mod emotion;
pub mod error;
pub mod message;
pub mod mood;
pub mod provider;
pub mod session;
pub mod tones;
pub mod trial;

pub use emotion::{EmotionCategory, EmotionClassifier, Locale, SoundProfile};
pub use error::{CoreError, Result};
pub use message::{ChatLog, LogEntry, Sender};
pub use mood::{Mood, SessionTier};
pub use provider::{AssistantProvider, SpeechRequest, Voice};
pub use session::{AudioSink, SessionController, SessionKind};
pub use trial::{TrialAdmission, TrialGate, TrialGateConfig};
