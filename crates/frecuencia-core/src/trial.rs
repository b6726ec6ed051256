//! Free Trial Gate
//!
//! One free session per identifier at a time, with a cap on how many trials
//! run concurrently. Check and admit happen under one lock.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::session::SessionKind;

/// Gate configuration
#[derive(Clone, Debug)]
pub struct TrialGateConfig {
    /// How long an identifier stays blocked after being admitted
    pub window: chrono::Duration,

    /// Maximum trials running at once
    pub max_concurrent: usize,
}

impl Default for TrialGateConfig {
    fn default() -> Self {
        Self {
            window: SessionKind::Free.ttl(),
            max_concurrent: 10,
        }
    }
}

/// Granted trial
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialAdmission {
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
}

/// In-memory trial gate. Not persisted across restarts.
pub struct TrialGate {
    config: TrialGateConfig,
    active: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for TrialGate {
    fn default() -> Self {
        Self::new(TrialGateConfig::default())
    }
}

impl TrialGate {
    pub fn new(config: TrialGateConfig) -> Self {
        Self {
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub const fn config(&self) -> &TrialGateConfig {
        &self.config
    }

    /// Admit `identifier` for a trial starting at `now`
    pub fn try_admit(&self, identifier: &str, now: DateTime<Utc>) -> Result<TrialAdmission> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(CoreError::InvalidInput("identifier is empty".into()));
        }

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.retain(|_, expires_at| *expires_at > now);

        if active.contains_key(identifier) {
            return Err(CoreError::TrialActive(identifier.to_string()));
        }
        if active.len() >= self.config.max_concurrent {
            return Err(CoreError::TrialCapacity(active.len()));
        }

        let expires_at = now + self.config.window;
        active.insert(identifier.to_string(), expires_at);

        tracing::debug!(identifier, %expires_at, running = active.len(), "Trial admitted");

        Ok(TrialAdmission {
            identifier: identifier.to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_request_inside_window_rejected() {
        let gate = TrialGate::default();
        let now = Utc::now();

        let admission = gate.try_admit("ana@example.com", now).unwrap();
        assert_eq!(admission.expires_at, now + chrono::Duration::seconds(8));

        let err = gate
            .try_admit("ana@example.com", now + chrono::Duration::seconds(3))
            .unwrap_err();
        assert!(matches!(err, CoreError::TrialActive(_)));
    }

    #[test]
    fn test_available_again_after_window() {
        let gate = TrialGate::default();
        let now = Utc::now();

        gate.try_admit("ana@example.com", now).unwrap();
        assert!(gate
            .try_admit("ana@example.com", now + chrono::Duration::seconds(8))
            .is_ok());
    }

    #[test]
    fn test_capacity_limit() {
        let gate = TrialGate::new(TrialGateConfig {
            window: chrono::Duration::seconds(8),
            max_concurrent: 2,
        });
        let now = Utc::now();

        gate.try_admit("a", now).unwrap();
        gate.try_admit("b", now).unwrap();
        let err = gate.try_admit("c", now).unwrap_err();
        assert!(matches!(err, CoreError::TrialCapacity(2)));
        assert!(err.is_retryable());

        // Expired trials free their slot
        let later = now + chrono::Duration::seconds(8);
        assert!(gate.try_admit("c", later).is_ok());
    }

    #[test]
    fn test_blank_identifier_rejected() {
        let gate = TrialGate::default();
        assert!(matches!(
            gate.try_admit("  ", Utc::now()),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
