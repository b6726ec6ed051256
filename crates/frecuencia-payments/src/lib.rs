//! # frecuencia-payments
//!
//! Hosted checkout and webhook reconciliation for Frecuencia sessions.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Frecuencia │────▶│  Stripe Hosted  │────▶│  Frecuencia │
//! │  (session)  │     │  Checkout Page  │     │  (success)  │
//! └─────────────┘     └────────┬────────┘     └─────────────┘
//!                              │ checkout.session.completed
//!                              ▼
//!                     ┌─────────────────┐     ┌─────────────┐
//!                     │ WebhookHandler  │────▶│ LedgerStore │
//!                     └─────────────────┘     └─────────────┘
//! ```
//!
//! The checkout metadata bag decides what a payment becomes: a paid session,
//! one half of a VIP purchase, a donation, or an "other" payment.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use frecuencia_payments::{CheckoutGateway, CheckoutRequest, StripeClient};
//!
//! let client = StripeClient::new("sk_test_xxx", "whsec_xxx");
//! let session = client.create_checkout_session(request).await?;
//!
//! // Redirect user to: session.url
//! ```

mod checkout;
mod error;
mod ledger;
mod store;
mod webhook;

pub use checkout::{
    ActionType, CheckoutGateway, CheckoutRequest, CheckoutSession, StripeClient,
    META_ACTION_TYPE, META_DONOR, META_MOOD, META_REF_ID, META_SESSION_TYPE, META_VOICE,
};
pub use error::{PaymentError, Result};
pub use ledger::{
    generate_reference, is_valid_reference, DonationRecord, Ledger, OtherPayment, SessionRecord,
    VipPhase, VipRecord, MAX_REFERENCE_LEN,
};
pub use store::{JsonFileLedgerStore, LedgerStore, MemoryLedgerStore};
pub use webhook::{
    verify_signature, CompletedCheckout, WebhookEvent, WebhookHandler, WebhookOutcome,
    DEFAULT_TOLERANCE_SECS,
};
