//! Stripe Webhook Handling
//!
//! Verifies `checkout.session.completed` callbacks and reconciles them into
//! the ledger according to the `actionType` metadata:
//!
//! ```text
//!  full_session  ── none ─────────────▶ session (paid, terminal)
//!  vip_initial   ── none ─────────────▶ vip (initial_paid)
//!  vip_donation  ── vip (initial_paid) ▶ vip (complete, amounts summed)
//!  donation      ── none ─────────────▶ donation
//!  anything else ── none ─────────────▶ other payment
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use frecuencia_core::{Mood, SessionKind, Voice};

use crate::checkout::{
    ActionType, META_ACTION_TYPE, META_DONOR, META_MOOD, META_REF_ID, META_SESSION_TYPE,
    META_VOICE,
};
use crate::error::{PaymentError, Result};
use crate::ledger::{
    generate_reference, DonationRecord, OtherPayment, SessionRecord, VipRecord,
};
use crate::store::LedgerStore;

type HmacSha256 = Hmac<Sha256>;

/// Oldest signature timestamp accepted, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Verify a `Stripe-Signature` header (`t=<timestamp>,v1=<hex hmac>`).
///
/// The signed payload is `"{t}.{payload}"` keyed by the endpoint secret.
/// Any of several `v1` entries may match.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = Some(t),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::WebhookSignature("malformed timestamp".into()))?;
    if (now - ts).abs() > tolerance_secs {
        return Err(PaymentError::WebhookSignature(
            "timestamp outside the tolerance zone".into(),
        ));
    }

    let matched = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(PaymentError::WebhookSignature(
            "no signatures found matching the expected signature for payload".into(),
        ))
    }
}

/// Raw Stripe event envelope
#[derive(Clone, Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Clone, Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

/// Fields of a completed checkout session the reconciler needs
#[derive(Clone, Debug, Deserialize)]
pub struct CompletedCheckout {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    payment_intent: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

impl CompletedCheckout {
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn action_type(&self) -> ActionType {
        self.metadata(META_ACTION_TYPE)
            .map_or_else(|| ActionType::Other("unknown".into()), ActionType::parse)
    }

    pub fn amount(&self) -> i64 {
        self.amount_total.unwrap_or(0)
    }

    pub fn currency(&self) -> String {
        self.currency.clone().unwrap_or_else(|| "eur".into())
    }

    pub fn email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.customer_details.as_ref()?.email.as_deref())
            .filter(|e| !e.trim().is_empty())
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        match self.payment_intent.as_ref()? {
            serde_json::Value::String(id) => Some(id.as_str()),
            serde_json::Value::Object(obj) => obj.get("id")?.as_str(),
            _ => None,
        }
    }

    /// Key for the daily counter: email, else payment intent
    pub fn user_key(&self) -> Option<&str> {
        self.email().or_else(|| self.payment_intent_id())
    }

    /// VIP correlation reference (`refId`, or legacy `ref`)
    pub fn reference(&self) -> Option<&str> {
        self.metadata(META_REF_ID).or_else(|| self.metadata("ref"))
    }
}

/// Parsed webhook event
#[derive(Clone, Debug)]
pub enum WebhookEvent {
    /// Checkout completed - reconcile into the ledger
    CheckoutCompleted {
        event_id: String,
        checkout: CompletedCheckout,
    },

    /// Unhandled event type
    Other { event_id: String, event_type: String },
}

/// What the reconciliation did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    SessionRecorded(SessionRecord),
    VipOpened(VipRecord),
    VipCompleted(VipRecord),
    DonationRecorded(DonationRecord),
    OtherRecorded(OtherPayment),
    /// The checkout was already applied
    Duplicate { stripe_session_id: String },
    /// Event type we do not act on
    Ignored { event_type: String },
}

/// Webhook handler
pub struct WebhookHandler<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> WebhookHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str, secret: &str) -> Result<WebhookEvent> {
        verify_signature(
            payload,
            signature,
            secret,
            Utc::now().timestamp(),
            DEFAULT_TOLERANCE_SECS,
        )?;
        Self::parse_payload(payload)
    }

    /// Parse an already verified payload
    pub fn parse_payload(payload: &str) -> Result<WebhookEvent> {
        let envelope: EventEnvelope = serde_json::from_str(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        if envelope.event_type != CHECKOUT_COMPLETED {
            return Ok(WebhookEvent::Other {
                event_id: envelope.id,
                event_type: envelope.event_type,
            });
        }

        let checkout: CompletedCheckout = serde_json::from_value(envelope.data.object)
            .map_err(|e| PaymentError::WebhookParse(format!("invalid checkout session data: {e}")))?;

        Ok(WebhookEvent::CheckoutCompleted {
            event_id: envelope.id,
            checkout,
        })
    }

    /// Process a webhook event
    pub fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        self.handle_at(event, Utc::now())
    }

    /// Process a webhook event as of `now`
    pub fn handle_at(&self, event: WebhookEvent, now: DateTime<Utc>) -> Result<WebhookOutcome> {
        let (event_id, checkout) = match event {
            WebhookEvent::CheckoutCompleted { event_id, checkout } => (event_id, checkout),
            WebhookEvent::Other {
                event_id,
                event_type,
            } => {
                tracing::debug!(%event_id, %event_type, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
        };

        let action = checkout.action_type();
        tracing::info!(
            %event_id,
            session_id = %checkout.id,
            action_type = %action,
            amount = checkout.amount(),
            "Processing completed checkout"
        );

        let outcome = self.store.update(|ledger| {
            if ledger.contains_checkout(&checkout.id) {
                return Ok(WebhookOutcome::Duplicate {
                    stripe_session_id: checkout.id.clone(),
                });
            }

            let outcome = match &action {
                ActionType::FullSession => {
                    let record = SessionRecord::paid(
                        checkout.amount(),
                        checkout.currency(),
                        &checkout.id,
                        checkout.metadata(META_MOOD).map_or_else(Mood::default, Mood::parse),
                        checkout.metadata(META_VOICE).map_or_else(Voice::default, Voice::parse),
                        checkout
                            .metadata(META_SESSION_TYPE)
                            .and_then(SessionKind::parse)
                            .unwrap_or(SessionKind::Full),
                        now,
                    );
                    ledger.sessions.push(record.clone());
                    WebhookOutcome::SessionRecorded(record)
                }

                ActionType::VipInitial => {
                    let supplied = checkout.reference();
                    if let Some(reference) = supplied.filter(|r| ledger.find_vip(r).is_some()) {
                        tracing::warn!(
                            session_id = %checkout.id,
                            %reference,
                            "VIP reference already in use, keeping payment aside"
                        );
                        let record = OtherPayment::new(
                            action.as_str(),
                            checkout.amount(),
                            checkout.currency(),
                            &checkout.id,
                            Some(reference.to_string()),
                            now,
                        );
                        ledger.other_payments.push(record.clone());
                        WebhookOutcome::OtherRecorded(record)
                    } else {
                        let reference = supplied.map_or_else(generate_reference, str::to_string);
                        let record = VipRecord::initial(
                            reference,
                            checkout.amount(),
                            &checkout.id,
                            checkout.metadata(META_VOICE).map_or_else(Voice::default, Voice::parse),
                            now,
                        );
                        ledger.vip_sessions.push(record.clone());
                        WebhookOutcome::VipOpened(record)
                    }
                }

                ActionType::VipDonation => {
                    let reference = checkout.reference();
                    match ledger.complete_vip(reference, checkout.amount(), &checkout.id, now) {
                        Some(record) => WebhookOutcome::VipCompleted(record),
                        None => {
                            tracing::warn!(
                                session_id = %checkout.id,
                                reference = ?reference,
                                pending = ledger.pending_vip_count(),
                                "No unambiguous pending VIP record, keeping payment aside"
                            );
                            let record = OtherPayment::new(
                                action.as_str(),
                                checkout.amount(),
                                checkout.currency(),
                                &checkout.id,
                                reference.map(str::to_string),
                                now,
                            );
                            ledger.other_payments.push(record.clone());
                            WebhookOutcome::OtherRecorded(record)
                        }
                    }
                }

                ActionType::Donation => {
                    let donor = checkout
                        .email()
                        .or_else(|| checkout.metadata(META_DONOR))
                        .unwrap_or("anonymous");
                    let record = DonationRecord::new(
                        checkout.amount(),
                        checkout.currency(),
                        donor,
                        &checkout.id,
                        now,
                    );
                    ledger.donations.push(record.clone());
                    WebhookOutcome::DonationRecorded(record)
                }

                ActionType::Other(kind) => {
                    let record = OtherPayment::new(
                        kind.as_str(),
                        checkout.amount(),
                        checkout.currency(),
                        &checkout.id,
                        checkout.reference().map(str::to_string),
                        now,
                    );
                    ledger.other_payments.push(record.clone());
                    WebhookOutcome::OtherRecorded(record)
                }
            };

            if let Some(user_key) = checkout.user_key() {
                ledger.increment_daily(now.date_naive(), user_key);
            }

            Ok(outcome)
        })?;

        match &outcome {
            WebhookOutcome::SessionRecorded(record) => tracing::info!(
                record_id = %record.id,
                mood = %record.mood,
                expires_at = %record.expires_at,
                "Recorded paid session"
            ),
            WebhookOutcome::VipOpened(record) => tracing::info!(
                reference = %record.reference,
                amount = record.paid_amount,
                "Opened VIP session"
            ),
            WebhookOutcome::VipCompleted(record) => tracing::info!(
                reference = %record.reference,
                total = record.paid_amount,
                "Completed VIP session"
            ),
            WebhookOutcome::DonationRecorded(record) => tracing::info!(
                amount = record.amount,
                "Recorded donation"
            ),
            WebhookOutcome::OtherRecorded(record) => tracing::info!(
                action_type = %record.action_type,
                amount = record.amount,
                "Recorded other payment"
            ),
            WebhookOutcome::Duplicate { stripe_session_id } => tracing::debug!(
                %stripe_session_id,
                "Checkout already reconciled"
            ),
            WebhookOutcome::Ignored { .. } => {}
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::VipPhase;
    use crate::store::{JsonFileLedgerStore, MemoryLedgerStore};

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn completed(session_id: &str, amount: i64, metadata: serde_json::Value) -> WebhookEvent {
        let payload = serde_json::json!({
            "id": format!("evt_{session_id}"),
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": session_id,
                "amount_total": amount,
                "currency": "eur",
                "customer_details": { "email": "ana@example.com" },
                "payment_intent": format!("pi_{session_id}"),
                "metadata": metadata,
            }}
        });
        WebhookHandler::<MemoryLedgerStore>::parse_payload(&payload.to_string()).unwrap()
    }

    fn handler() -> (Arc<MemoryLedgerStore>, WebhookHandler<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        (Arc::clone(&store), WebhookHandler::new(store))
    }

    #[test]
    fn test_signature_roundtrip() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, now);

        assert!(verify_signature(payload, &header, SECRET, now, 300).is_ok());
        assert!(verify_signature(payload, &header, "whsec_other", now, 300).is_err());
        assert!(verify_signature("{}", &header, SECRET, now, 300).is_err());
        assert!(verify_signature(payload, &header, SECRET, now + 301, 300).is_err());
        assert!(verify_signature(payload, "v1=abc", SECRET, now, 300).is_err());
    }

    #[test]
    fn test_full_session_recorded_once() {
        let (store, handler) = handler();
        let now = Utc::now();
        let event = completed(
            "cs_full",
            5000,
            serde_json::json!({"actionType": "full_session", "mood": "calm", "voice": "Maria"}),
        );

        let outcome = handler.handle_at(event.clone(), now).unwrap();
        let WebhookOutcome::SessionRecorded(record) = outcome else {
            panic!("expected a session record, got {outcome:?}");
        };
        assert!(record.paid);
        assert_eq!(record.mood, Mood::Calm);
        assert_eq!(record.voice, Voice::Maria);
        assert_eq!(
            record.expires_at.timestamp_millis() - record.created.timestamp_millis(),
            1_200_000
        );

        // Re-delivery is a no-op
        let again = handler.handle_at(event, now).unwrap();
        assert!(matches!(again, WebhookOutcome::Duplicate { .. }));

        let ledger = store.snapshot().unwrap();
        assert_eq!(ledger.sessions.len(), 1);
        assert_eq!(ledger.daily_count(now.date_naive(), "ana@example.com"), 1);
    }

    #[test]
    fn test_vip_two_phase_merge() {
        let (store, handler) = handler();
        handler
            .handle(completed(
                "cs_vip_1",
                2000,
                serde_json::json!({"actionType": "vip_initial", "refId": "vip_abc"}),
            ))
            .unwrap();
        let outcome = handler
            .handle(completed(
                "cs_vip_2",
                3000,
                serde_json::json!({"actionType": "vip_donation", "refId": "vip_abc"}),
            ))
            .unwrap();

        let WebhookOutcome::VipCompleted(record) = outcome else {
            panic!("expected VIP completion, got {outcome:?}");
        };
        assert_eq!(record.paid_amount, 5000);
        assert_eq!(record.phase, VipPhase::Complete);
        assert!(record.complete);

        let ledger = store.snapshot().unwrap();
        assert_eq!(ledger.vip_sessions.len(), 1);
        assert_eq!(ledger.record_count(), 1);
    }

    #[test]
    fn test_vip_initial_without_ref_gets_generated_reference() {
        let (_, handler) = handler();
        let outcome = handler
            .handle(completed(
                "cs_vip",
                2000,
                serde_json::json!({"actionType": "vip_initial"}),
            ))
            .unwrap();
        let WebhookOutcome::VipOpened(record) = outcome else {
            panic!("expected VIP record, got {outcome:?}");
        };
        assert!(record.reference.starts_with("vip_"));
        assert_eq!(record.phase, VipPhase::InitialPaid);
    }

    #[test]
    fn test_vip_initial_with_reused_reference_is_kept_aside() {
        let (store, handler) = handler();
        for id in ["cs_first", "cs_second"] {
            handler
                .handle(completed(
                    id,
                    2000,
                    serde_json::json!({"actionType": "vip_initial", "refId": "shared"}),
                ))
                .unwrap();
        }

        let ledger = store.snapshot().unwrap();
        assert_eq!(ledger.vip_sessions.len(), 1);
        assert_eq!(ledger.vip_sessions[0].stripe_session_id, "cs_first");
        assert_eq!(ledger.other_payments.len(), 1);
        assert_eq!(ledger.other_payments[0].stripe_session_id, "cs_second");

        // The completion still lands on the original record
        let outcome = handler
            .handle(completed(
                "cs_done",
                3000,
                serde_json::json!({"actionType": "vip_donation", "refId": "shared"}),
            ))
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::VipCompleted(ref r) if r.paid_amount == 5000));
    }

    /// N completed checkouts produce N top-level records, minus one for
    /// each VIP pair merged into a single record.
    #[test]
    fn test_record_count_after_mixed_events() {
        let (store, handler) = handler();
        let events = [
            ("cs_1", 5000, serde_json::json!({"actionType": "full_session"})),
            ("cs_2", 2000, serde_json::json!({"actionType": "vip_initial", "refId": "vip_a"})),
            ("cs_3", 1500, serde_json::json!({"actionType": "donation"})),
            ("cs_4", 3000, serde_json::json!({"actionType": "vip_donation", "refId": "vip_a"})),
            ("cs_5", 700, serde_json::json!({"actionType": "tip"})),
            ("cs_6", 5000, serde_json::json!({"actionType": "full_session", "mood": "love"})),
        ];
        let total = events.len();
        for (id, amount, metadata) in events {
            handler.handle(completed(id, amount, metadata)).unwrap();
        }

        let ledger = store.snapshot().unwrap();
        assert_eq!(ledger.record_count(), total - 1);
        assert_eq!(ledger.sessions.len(), 2);
        assert_eq!(ledger.vip_sessions.len(), 1);
        assert_eq!(ledger.donations.len(), 1);
        assert_eq!(ledger.other_payments.len(), 1);
    }

    #[test]
    fn test_concurrent_deliveries_all_persisted() {
        const DELIVERIES: usize = 16;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = Arc::new(JsonFileLedgerStore::open(&path).unwrap());
        let handler = WebhookHandler::new(Arc::clone(&store));

        std::thread::scope(|scope| {
            for i in 0..DELIVERIES {
                let handler = &handler;
                scope.spawn(move || {
                    let event = completed(
                        &format!("cs_par_{i}"),
                        5000,
                        serde_json::json!({"actionType": "full_session"}),
                    );
                    handler.handle(event).unwrap();
                });
            }
        });

        assert_eq!(store.snapshot().unwrap().sessions.len(), DELIVERIES);

        let reopened = JsonFileLedgerStore::open(&path).unwrap();
        let ledger = reopened.snapshot().unwrap();
        assert_eq!(ledger.sessions.len(), DELIVERIES);
        assert_eq!(ledger.daily_count(Utc::now().date_naive(), "ana@example.com"), 16);
    }

    /// Two pending VIP records and a completion without `refId` cannot be
    /// attributed; neither record is completed and the payment is kept aside.
    #[test]
    fn test_ambiguous_vip_completion_is_not_merged() {
        let (store, handler) = handler();
        for id in ["cs_a", "cs_b"] {
            handler
                .handle(completed(id, 2000, serde_json::json!({"actionType": "vip_initial"})))
                .unwrap();
        }

        let outcome = handler
            .handle(completed(
                "cs_c",
                3000,
                serde_json::json!({"actionType": "vip_donation"}),
            ))
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::OtherRecorded(_)));

        let ledger = store.snapshot().unwrap();
        assert_eq!(ledger.pending_vip_count(), 2);
        assert_eq!(ledger.other_payments.len(), 1);
        assert_eq!(ledger.other_payments[0].action_type, "vip_donation");
    }

    #[test]
    fn test_unknown_action_is_other_payment() {
        let (store, handler) = handler();
        let outcome = handler
            .handle(completed("cs_tip", 700, serde_json::json!({"actionType": "tip"})))
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::OtherRecorded(ref r) if r.action_type == "tip"));

        handler
            .handle(completed("cs_none", 100, serde_json::json!({})))
            .unwrap();
        assert_eq!(store.snapshot().unwrap().other_payments.len(), 2);
    }

    #[test]
    fn test_donation_uses_customer_email() {
        let (store, handler) = handler();
        handler
            .handle(completed("cs_don", 1500, serde_json::json!({"actionType": "donation"})))
            .unwrap();
        let ledger = store.snapshot().unwrap();
        assert_eq!(ledger.donations[0].donor, "ana@example.com");
        assert_eq!(ledger.donations[0].amount, 1500);
    }

    #[test]
    fn test_other_event_types_ignored() {
        let (store, handler) = handler();
        let event = WebhookHandler::<MemoryLedgerStore>::parse_payload(
            r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#,
        )
        .unwrap();
        let outcome = handler.handle(event).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "invoice.paid".into()
            }
        );
        assert_eq!(store.snapshot().unwrap().record_count(), 0);
    }

    #[test]
    fn test_parse_event_rejects_bad_signature() {
        let (_, handler) = handler();
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
        let header = sign(payload, Utc::now().timestamp());

        assert!(handler.parse_event(payload, &header, SECRET).is_ok());
        assert!(matches!(
            handler.parse_event(payload, &header, "whsec_wrong"),
            Err(PaymentError::WebhookSignature(_))
        ));
    }
}
