//! Solfeggio Tones
//!
//! Frequencies with a pre-recorded sample. Anything else is synthesised on
//! the client.

/// Frequencies (Hz) shipped as recorded samples
pub const SAMPLED_FREQUENCIES: [u32; 8] = [396, 417, 432, 528, 639, 741, 852, 963];

/// Default tone when the client does not pick one
pub const DEFAULT_FREQUENCY: u32 = 432;

/// Path of the recorded sample for `freq`, if there is one
pub fn sample_for(freq: u32) -> Option<String> {
    SAMPLED_FREQUENCIES
        .contains(&freq)
        .then(|| format!("audio/{freq}hz.mp3"))
}

/// Clamp a client volume (0.0..=1.0)
pub fn clamp_volume(volume: f32) -> f32 {
    volume.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_frequency() {
        assert_eq!(sample_for(528).as_deref(), Some("audio/528hz.mp3"));
        assert_eq!(sample_for(DEFAULT_FREQUENCY).as_deref(), Some("audio/432hz.mp3"));
    }

    #[test]
    fn test_unsampled_frequency() {
        assert!(sample_for(440).is_none());
    }

    #[test]
    fn test_volume_clamp() {
        assert!((clamp_volume(1.7) - 1.0).abs() < f32::EPSILON);
        assert!(clamp_volume(-0.2).abs() < f32::EPSILON);
    }
}
