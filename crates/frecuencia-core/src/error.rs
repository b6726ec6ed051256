//! Error Types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Assistant provider (text generation or speech) failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider not configured or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Audio playback failed
    #[error("Playback error: {0}")]
    Playback(String),

    /// Free trial refused for this identifier
    #[error("Trial already active for {0}")]
    TrialActive(String),

    /// Too many trials running at once
    #[error("Trial capacity reached ({0} running)")]
    TrialCapacity(usize),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

}

impl CoreError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::TrialCapacity(_) | Self::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(_) => "The assistant could not generate a response.".into(),
            Self::ProviderUnavailable(_) => {
                "The assistant is currently unavailable. Please try again.".into()
            }
            Self::Playback(_) => "The audio could not be played.".into(),
            Self::TrialActive(_) => {
                "You already have a free session running. Wait for it to finish.".into()
            }
            Self::TrialCapacity(_) => "Too many free sessions right now. Try again shortly.".into(),
            Self::InvalidInput(msg) => format!("Invalid input: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
