//! Session Lifecycle
//!
//! Session kinds, their durations, and the controller that plays a mood
//! track for the length of a session.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::{CoreError, Result};
use crate::message::{ChatLog, LogEntry};
use crate::mood::{Mood, SessionTier};
use crate::tones::clamp_volume;

/// Free preview length
pub const FREE_SESSION: Duration = Duration::from_secs(8);

/// Paid session length, also the lifetime of a paid session record
pub const PAID_SESSION: Duration = Duration::from_secs(20 * 60);

/// Kind of session the user starts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Free,
    Full,
    Vip,
}

impl SessionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Full => "full",
            Self::Vip => "vip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "full" | "full_session" => Some(Self::Full),
            "vip" => Some(Self::Vip),
            _ => None,
        }
    }

    pub const fn duration(&self) -> Duration {
        match self {
            Self::Free => FREE_SESSION,
            Self::Full | Self::Vip => PAID_SESSION,
        }
    }

    /// Lifetime as a chrono duration, for record expiry arithmetic
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.duration()).unwrap_or_else(|_| chrono::Duration::zero())
    }

    pub const fn tier(&self) -> SessionTier {
        match self {
            Self::Free => SessionTier::Free,
            Self::Full | Self::Vip => SessionTier::Vip,
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output device for session audio
pub trait AudioSink: Send + Sync {
    /// Start playing `src` at `volume` (0.0..=1.0)
    fn play(&self, src: &str, volume: f32) -> Result<()>;

    /// Stop playback
    fn pause(&self);

    /// Change volume of the current track
    fn set_volume(&self, _volume: f32) {}
}

/// What the controller started
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPlan {
    pub kind: SessionKind,
    pub mood: Mood,
    pub src: String,
    pub duration: Duration,
}

/// Drives an [`AudioSink`] for one session at a time.
///
/// At most one end-of-session timer is pending. Starting a new session or
/// stopping aborts it, so a stale timer never cuts the next session short.
pub struct SessionController<A: AudioSink + 'static> {
    sink: Arc<A>,
    log: Arc<Mutex<ChatLog>>,
    mood: Mood,
    volume: f32,
    timer: Option<JoinHandle<()>>,
}

impl<A: AudioSink + 'static> SessionController<A> {
    pub fn new(sink: Arc<A>) -> Self {
        let mut log = ChatLog::new();
        log.system(
            "Bienvenido a Frecuencia Central. Selecciona tu estado de ánimo y ajusta la intensidad para comenzar.",
        );
        log.system("Puedes probar una sesión gratuita de 8 segundos antes de decidir.");

        Self {
            sink,
            log: Arc::new(Mutex::new(log)),
            mood: Mood::Neutral,
            volume: 0.5,
            timer: None,
        }
    }

    pub const fn mood(&self) -> Mood {
        self.mood
    }

    pub fn select_mood(&mut self, mood: Mood) {
        self.mood = mood;
        self.push_system(format!(
            "Has seleccionado: {mood}. Ahora puedes iniciar tu sesión."
        ));
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
        self.sink.set_volume(self.volume);
    }

    /// Whether a session timer is still pending
    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start a session of `kind` for the selected mood.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&mut self, kind: SessionKind) -> Result<SessionPlan> {
        self.cancel_timer();

        let src = self.mood.audio_url(kind.tier());
        let duration = kind.duration();

        if let Err(e) = self.sink.play(&src, self.volume) {
            self.push_error(e.to_string());
            return Err(e);
        }

        self.push_system(format!(
            "Reproduciendo sesión {kind} para {} ({}s)",
            self.mood,
            duration.as_secs()
        ));
        tracing::debug!(kind = %kind, mood = %self.mood, "Session started");

        let sink = Arc::clone(&self.sink);
        let log = Arc::clone(&self.log);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            sink.pause();
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .system("Sesión finalizada.");
        }));

        Ok(SessionPlan {
            kind,
            mood: self.mood,
            src,
            duration,
        })
    }

    /// Stop the current session early
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(CoreError::InvalidInput("no session is running".into()));
        }
        self.cancel_timer();
        self.sink.pause();
        self.push_system("Sesión detenida.");
        Ok(())
    }

    /// Record a user line and the assistant's answer (or the failure)
    pub fn record_exchange(&self, prompt: &str, outcome: std::result::Result<&str, &CoreError>) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.user(prompt);
        match outcome {
            Ok(text) => log.assistant(text),
            Err(e) => log.error(e.user_message()),
        }
    }

    /// Snapshot of the log
    pub fn log(&self) -> Vec<LogEntry> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .to_vec()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn push_system(&self, text: impl Into<String>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .system(text);
    }

    fn push_error(&self, text: impl Into<String>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error(text);
    }
}

impl<A: AudioSink + 'static> Drop for SessionController<A> {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
