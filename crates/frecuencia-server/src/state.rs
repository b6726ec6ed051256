//! Application State

use std::sync::Arc;

use frecuencia_core::{AssistantProvider, EmotionClassifier, TrialGate};
use frecuencia_payments::{CheckoutGateway, JsonFileLedgerStore};
use frecuencia_runtime::AudioClipStore;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    /// Session ledger persisted to `DB_PATH`
    pub ledger: Arc<JsonFileLedgerStore>,

    /// Checkout gateway (None if Stripe is not configured)
    pub checkout: Option<Arc<dyn CheckoutGateway>>,

    /// Webhook signing secret (None disables `/webhook`)
    pub webhook_secret: Option<String>,

    /// AI text + speech provider (None if not configured)
    pub assistant: Option<Arc<dyn AssistantProvider>>,

    /// Writer for generated MP3 replies
    pub clips: AudioClipStore,

    pub trials: Arc<TrialGate>,

    pub classifier: EmotionClassifier,
}

impl AppState {
    /// State with no payment or assistant backends attached
    pub fn new(config: ServerConfig, ledger: Arc<JsonFileLedgerStore>) -> Self {
        let clips = AudioClipStore::new(config.public_dir.clone());
        let trials = Arc::new(TrialGate::new(config.trial.clone()));

        Self {
            config: Arc::new(config),
            ledger,
            checkout: None,
            webhook_secret: None,
            assistant: None,
            clips,
            trials,
            classifier: EmotionClassifier::default(),
        }
    }

    #[must_use]
    pub fn with_checkout(mut self, gateway: Arc<dyn CheckoutGateway>, webhook_secret: String) -> Self {
        self.checkout = Some(gateway);
        self.webhook_secret = Some(webhook_secret);
        self
    }

    #[must_use]
    pub fn with_assistant(mut self, assistant: Arc<dyn AssistantProvider>) -> Self {
        self.assistant = Some(assistant);
        self
    }
}
