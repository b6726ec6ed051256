//! Session Ledger
//!
//! Every record produced by a completed checkout, kept in one document that
//! the stores load and persist as a whole.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use frecuencia_core::{Mood, SessionKind, Voice};

fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fresh VIP correlation reference
pub fn generate_reference() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("vip_{}", &id[..12])
}

/// Longest client-supplied reference accepted
pub const MAX_REFERENCE_LEN: usize = 64;

/// Whether `reference` is safe to carry in metadata and redirect URLs:
/// 1 to 64 ASCII letters, digits, `_` or `-`.
pub fn is_valid_reference(reference: &str) -> bool {
    (1..=MAX_REFERENCE_LEN).contains(&reference.len())
        && reference
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Paid full session. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub amount: i64,
    pub currency: String,
    pub paid: bool,
    pub stripe_session_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
    pub mood: Mood,
    pub voice: Voice,
    pub session_type: SessionKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Paid session created at `created`, expiring one session length later
    pub fn paid(
        amount: i64,
        currency: impl Into<String>,
        stripe_session_id: impl Into<String>,
        mood: Mood,
        voice: Voice,
        session_type: SessionKind,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            record_type: "full_session".into(),
            amount,
            currency: currency.into(),
            paid: true,
            stripe_session_id: stripe_session_id.into(),
            created,
            mood,
            voice,
            session_type,
            expires_at: created + SessionKind::Full.ttl(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.paid && now < self.expires_at
    }
}

/// VIP flow phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VipPhase {
    InitialPaid,
    Complete,
}

/// Two-phase VIP purchase, correlated by `reference`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipRecord {
    pub id: String,
    pub phase: VipPhase,
    pub paid_amount: i64,
    #[serde(rename = "ref")]
    pub reference: String,
    pub stripe_session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_session_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
    pub complete: bool,
    pub voice: Voice,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

impl VipRecord {
    pub fn initial(
        reference: impl Into<String>,
        amount: i64,
        stripe_session_id: impl Into<String>,
        voice: Voice,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            phase: VipPhase::InitialPaid,
            paid_amount: amount,
            reference: reference.into(),
            stripe_session_id: stripe_session_id.into(),
            completion_session_id: None,
            created,
            complete: false,
            voice,
            completed_at: None,
        }
    }

    /// Merge the completion payment into this record
    fn merge_completion(&mut self, amount: i64, stripe_session_id: &str, now: DateTime<Utc>) {
        self.paid_amount += amount;
        self.phase = VipPhase::Complete;
        self.complete = true;
        self.completion_session_id = Some(stripe_session_id.to_string());
        self.completed_at = Some(now);
    }
}

/// Append-only donation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub donor: String,
    pub stripe_session_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
}

impl DonationRecord {
    pub fn new(
        amount: i64,
        currency: impl Into<String>,
        donor: impl Into<String>,
        stripe_session_id: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            amount,
            currency: currency.into(),
            donor: donor.into(),
            stripe_session_id: stripe_session_id.into(),
            created,
        }
    }
}

/// Payment that fits no other list: unknown action types and VIP
/// completions with no unambiguous pending record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherPayment {
    pub id: String,
    pub action_type: String,
    pub amount: i64,
    pub currency: String,
    pub stripe_session_id: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
}

impl OtherPayment {
    pub fn new(
        action_type: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        stripe_session_id: impl Into<String>,
        reference: Option<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            action_type: action_type.into(),
            amount,
            currency: currency.into(),
            stripe_session_id: stripe_session_id.into(),
            reference,
            created,
        }
    }
}

/// Whole persisted state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Ledger {
    pub sessions: Vec<SessionRecord>,
    pub vip_sessions: Vec<VipRecord>,
    pub donations: Vec<DonationRecord>,
    pub other_payments: Vec<OtherPayment>,
    /// `"<date>:<userKey>"` → completed checkouts that day
    pub daily_limits: BTreeMap<String, u32>,
}

impl Ledger {
    /// Number of top-level records across all lists
    pub fn record_count(&self) -> usize {
        self.sessions.len() + self.vip_sessions.len() + self.donations.len() + self.other_payments.len()
    }

    /// Whether a checkout session has already been applied
    pub fn contains_checkout(&self, stripe_session_id: &str) -> bool {
        self.sessions.iter().any(|s| s.stripe_session_id == stripe_session_id)
            || self.vip_sessions.iter().any(|v| {
                v.stripe_session_id == stripe_session_id
                    || v.completion_session_id.as_deref() == Some(stripe_session_id)
            })
            || self.donations.iter().any(|d| d.stripe_session_id == stripe_session_id)
            || self.other_payments.iter().any(|o| o.stripe_session_id == stripe_session_id)
    }

    pub fn find_session(&self, id: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.id == id || s.stripe_session_id == id)
    }

    pub fn find_vip(&self, reference: &str) -> Option<&VipRecord> {
        self.vip_sessions.iter().find(|v| v.reference == reference)
    }

    /// VIP records still waiting for their completion payment
    pub fn pending_vip_count(&self) -> usize {
        self.vip_sessions.iter().filter(|v| !v.complete).count()
    }

    /// Merge a completion payment into the matching pending VIP record.
    ///
    /// With a reference, only a pending record carrying that reference
    /// matches. Without one, the single pending record matches; zero or
    /// several pending records is ambiguous and nothing is merged.
    pub fn complete_vip(
        &mut self,
        reference: Option<&str>,
        amount: i64,
        stripe_session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<VipRecord> {
        let index = match reference {
            Some(reference) => self
                .vip_sessions
                .iter()
                .position(|v| !v.complete && v.reference == reference),
            None => {
                let mut pending = self
                    .vip_sessions
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.complete)
                    .map(|(i, _)| i);
                match (pending.next(), pending.next()) {
                    (Some(only), None) => Some(only),
                    _ => None,
                }
            }
        }?;

        let record = &mut self.vip_sessions[index];
        record.merge_completion(amount, stripe_session_id, now);
        Some(record.clone())
    }

    pub fn daily_count(&self, date: NaiveDate, user_key: &str) -> u32 {
        self.daily_limits
            .get(&daily_key(date, user_key))
            .copied()
            .unwrap_or(0)
    }

    /// Count one more completed checkout for `user_key` on `date`.
    ///
    /// Counters for days before `date` are dropped.
    pub fn increment_daily(&mut self, date: NaiveDate, user_key: &str) -> u32 {
        let day = date.format("%Y-%m-%d").to_string();
        self.daily_limits
            .retain(|key, _| key.split(':').next().is_some_and(|d| d >= day.as_str()));

        let count = self.daily_limits.entry(daily_key(date, user_key)).or_insert(0);
        *count += 1;
        *count
    }
}

fn daily_key(date: NaiveDate, user_key: &str) -> String {
    format!("{}:{}", date.format("%Y-%m-%d"), user_key.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vip(reference: &str, session: &str) -> VipRecord {
        VipRecord::initial(reference, 2000, session, Voice::Miguel, Utc::now())
    }

    #[test]
    fn test_session_expiry() {
        let created = Utc::now();
        let record = SessionRecord::paid(
            5000,
            "eur",
            "cs_1",
            Mood::Calm,
            Voice::Maria,
            SessionKind::Full,
            created,
        );

        assert_eq!((record.expires_at - created).num_milliseconds(), 1_200_000);
        assert!(record.is_active(created + chrono::Duration::minutes(19)));
        assert!(!record.is_active(created + chrono::Duration::minutes(20)));
    }

    #[test]
    fn test_complete_vip_by_reference() {
        let mut ledger = Ledger::default();
        ledger.vip_sessions.push(vip("a", "cs_a"));
        ledger.vip_sessions.push(vip("b", "cs_b"));

        let merged = ledger.complete_vip(Some("a"), 3000, "cs_a2", Utc::now()).unwrap();
        assert_eq!(merged.paid_amount, 5000);
        assert_eq!(merged.phase, VipPhase::Complete);
        assert_eq!(ledger.pending_vip_count(), 1);

        // Already complete
        assert!(ledger.complete_vip(Some("a"), 3000, "cs_a3", Utc::now()).is_none());
    }

    #[test]
    fn test_complete_vip_without_reference_requires_single_pending() {
        let mut ledger = Ledger::default();
        ledger.vip_sessions.push(vip("a", "cs_a"));
        ledger.vip_sessions.push(vip("b", "cs_b"));
        assert!(ledger.complete_vip(None, 3000, "cs_x", Utc::now()).is_none());

        let mut ledger = Ledger::default();
        ledger.vip_sessions.push(vip("a", "cs_a"));
        let merged = ledger.complete_vip(None, 3000, "cs_x", Utc::now()).unwrap();
        assert_eq!(merged.reference, "a");
    }

    #[test]
    fn test_daily_counter_is_case_insensitive() {
        let mut ledger = Ledger::default();
        let today = Utc::now().date_naive();

        assert_eq!(ledger.increment_daily(today, "Ana@Example.com"), 1);
        assert_eq!(ledger.increment_daily(today, "ana@example.com"), 2);
        assert_eq!(ledger.daily_count(today, "ANA@example.com"), 2);
        assert_eq!(ledger.daily_count(today.succ_opt().unwrap(), "ana@example.com"), 0);
    }

    #[test]
    fn test_daily_counter_drops_past_days() {
        let mut ledger = Ledger::default();
        let today = Utc::now().date_naive();
        let yesterday = today.pred_opt().unwrap();

        ledger.increment_daily(yesterday, "ana@example.com");
        ledger.increment_daily(yesterday, "luis@example.com");
        assert_eq!(ledger.daily_limits.len(), 2);

        ledger.increment_daily(today, "ana@example.com");
        assert_eq!(ledger.daily_limits.len(), 1);
        assert_eq!(ledger.daily_count(yesterday, "ana@example.com"), 0);
        assert_eq!(ledger.daily_count(today, "ana@example.com"), 1);
    }

    #[test]
    fn test_reference_validation() {
        assert!(is_valid_reference("vip_0a1b2c3d4e5f"));
        assert!(is_valid_reference(&generate_reference()));
        assert!(is_valid_reference("Order-42"));
        assert!(!is_valid_reference(""));
        assert!(!is_valid_reference("a b&x=1#f"));
        assert!(!is_valid_reference("ref/../x"));
        assert!(!is_valid_reference(&"a".repeat(MAX_REFERENCE_LEN + 1)));
    }

    #[test]
    fn test_ledger_json_shape() {
        let mut ledger = Ledger::default();
        ledger.vip_sessions.push(vip("ref_1", "cs_1"));

        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["vipSessions"][0]["ref"], "ref_1");
        assert_eq!(json["vipSessions"][0]["phase"], "initial_paid");
        assert!(json["dailyLimits"].is_object());

        let empty: Ledger = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.record_count(), 0);
    }
}
