//! Stripe Checkout Integration
//!
//! Hosted checkout sessions for one-off payments. Every session carries a
//! metadata bag (`actionType`, `mood`, `voice`, `refId`) that the webhook
//! handler later uses to decide what the payment was for.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Currency,
};

use crate::error::{PaymentError, Result};

/// Metadata key carrying the action type
pub const META_ACTION_TYPE: &str = "actionType";
/// Metadata key carrying the VIP correlation reference
pub const META_REF_ID: &str = "refId";
pub const META_MOOD: &str = "mood";
pub const META_VOICE: &str = "voice";
pub const META_SESSION_TYPE: &str = "sessionType";
pub const META_DONOR: &str = "donor";

/// What a checkout pays for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionType {
    FullSession,
    VipInitial,
    VipDonation,
    Donation,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::FullSession => "full_session",
            Self::VipInitial => "vip_initial",
            Self::VipDonation => "vip_donation",
            Self::Donation => "donation",
            Self::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "full_session" => Self::FullSession,
            "vip_initial" => Self::VipInitial,
            "vip_donation" => Self::VipDonation,
            "donation" => Self::Donation,
            other => Self::Other(other.to_string()),
        }
    }

    /// Price in minor units when the client does not send one
    pub const fn default_amount(&self) -> Option<i64> {
        match self {
            Self::FullSession => Some(5000),
            Self::VipInitial => Some(2000),
            Self::VipDonation => Some(3000),
            Self::Donation | Self::Other(_) => None,
        }
    }

    pub fn default_description(&self) -> &'static str {
        match self {
            Self::FullSession => "Sesión completa Frecuencia Central",
            Self::VipInitial => "Sesión VIP Frecuencia Central",
            Self::VipDonation => "Sesión VIP Frecuencia Central (completar)",
            Self::Donation => "Donación Frecuencia Central",
            Self::Other(_) => "Frecuencia Central",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Amount in minor currency units (cents)
    pub amount: i64,

    /// ISO currency code, lower-case
    pub currency: String,

    /// Product line shown on the hosted page
    pub description: String,

    /// Metadata echoed back in the webhook
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Pre-filled customer email
    #[serde(default)]
    pub customer_email: Option<String>,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Reject requests Stripe would refuse anyway
    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(PaymentError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.currency.trim().len() != 3 {
            return Err(PaymentError::InvalidRequest(format!(
                "unsupported currency: {}",
                self.currency
            )));
        }
        Ok(())
    }

    pub fn action_type(&self) -> Option<ActionType> {
        self.metadata.get(META_ACTION_TYPE).map(|a| ActionType::parse(a))
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub url: String,
}

/// Anything that can open a hosted checkout page
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        request.validate()?;

        let currency: Currency = request
            .currency
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| {
                PaymentError::InvalidRequest(format!("unsupported currency: {}", request.currency))
            })?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.customer_email = request.customer_email.as_deref();
        params.client_reference_id = request.metadata.get(META_REF_ID).map(String::as_str);
        params.metadata = Some(request.metadata.clone());

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(request.amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.description.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        tracing::info!(
            session_id = %session.id,
            amount = request.amount,
            action_type = ?request.action_type(),
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: i64, currency: &str) -> CheckoutRequest {
        CheckoutRequest {
            amount,
            currency: currency.into(),
            description: "test".into(),
            metadata: HashMap::from([(META_ACTION_TYPE.to_string(), "vip_initial".to_string())]),
            customer_email: None,
            success_url: "http://localhost/success".into(),
            cancel_url: "http://localhost/".into(),
        }
    }

    #[test]
    fn test_action_type_parsing() {
        assert_eq!(ActionType::parse("full_session"), ActionType::FullSession);
        assert_eq!(ActionType::parse("tip"), ActionType::Other("tip".into()));
        assert_eq!(ActionType::VipDonation.as_str(), "vip_donation");
        assert_eq!(ActionType::VipInitial.default_amount(), Some(2000));
    }

    #[test]
    fn test_validate() {
        assert!(request(5000, "eur").validate().is_ok());
        assert!(matches!(
            request(0, "eur").validate(),
            Err(PaymentError::InvalidRequest(_))
        ));
        assert!(request(100, "euros").validate().is_err());
        assert_eq!(request(100, "eur").action_type(), Some(ActionType::VipInitial));
    }
}
