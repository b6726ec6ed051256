//! Generated Audio Clips
//!
//! Writes synthesized MP3 replies under `<public>/audio` so the static file
//! service can hand them to the browser.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use frecuencia_core::error::{CoreError, Result};

/// Directory-backed clip writer
#[derive(Clone, Debug)]
pub struct AudioClipStore {
    public_dir: PathBuf,
}

impl AudioClipStore {
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
        }
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.public_dir.join("audio")
    }

    /// Fresh file name: `tts_<millis>_<6 random chars>.mp3`
    fn clip_name() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "tts_{}_{}.mp3",
            chrono::Utc::now().timestamp_millis(),
            &suffix[..6]
        )
    }

    /// Save an MP3 and return its public URL (`/audio/<file>`)
    pub async fn save(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Err(CoreError::InvalidInput("audio clip is empty".into()));
        }

        let dir = self.audio_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let name = Self::clip_name();
        let path = dir.join(&name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(audio).await?;
        file.flush().await?;

        tracing::debug!(path = %path.display(), bytes = audio.len(), "Saved audio clip");
        Ok(format!("/audio/{name}"))
    }

    /// Resolve a public URL back to its file, if it points into the clip dir
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix("/audio/")?;
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return None;
        }
        Some(self.audio_dir().join(Path::new(name)))
    }
}
