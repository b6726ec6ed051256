//! Mood Catalog
//!
//! The moods a user can pick from the session buttons, and the audio track
//! each one plays per tier.

use serde::{Deserialize, Serialize};

/// Mood selected by the user before starting a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Love,
    Calm,
    Success,
    Sad,
    #[default]
    Neutral,
}

/// Which track set a session draws from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionTier {
    /// Short preview tracks
    Free,
    /// Full-length tracks for paid sessions
    Vip,
}

impl Mood {
    pub const ALL: [Self; 5] = [
        Self::Love,
        Self::Calm,
        Self::Success,
        Self::Sad,
        Self::Neutral,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Love => "love",
            Self::Calm => "calm",
            Self::Success => "success",
            Self::Sad => "sad",
            Self::Neutral => "neutral",
        }
    }

    /// Parse a mood label. Unknown labels map to `Neutral`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "love" => Self::Love,
            "calm" => Self::Calm,
            "success" => Self::Success,
            "sad" => Self::Sad,
            _ => Self::Neutral,
        }
    }

    /// Static audio asset for this mood
    pub fn audio_url(&self, tier: SessionTier) -> String {
        let prefix = match tier {
            SessionTier::Free => "mood",
            SessionTier::Vip => "vip",
        };
        format!("/audio/{prefix}_{}.mp3", self.as_str())
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mood_falls_back_to_neutral() {
        assert_eq!(Mood::parse("euphoric"), Mood::Neutral);
        assert_eq!(Mood::parse(" Calm "), Mood::Calm);
    }

    #[test]
    fn test_audio_url_per_tier() {
        assert_eq!(Mood::Love.audio_url(SessionTier::Free), "/audio/mood_love.mp3");
        assert_eq!(Mood::Sad.audio_url(SessionTier::Vip), "/audio/vip_sad.mp3");
    }
}
