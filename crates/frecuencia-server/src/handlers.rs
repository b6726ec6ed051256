//! HTTP Handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use frecuencia_core::{
    CoreError, EmotionCategory, Locale, Mood, SessionTier, SpeechRequest, Voice,
    tones::{sample_for, SAMPLED_FREQUENCIES},
};
use frecuencia_payments::{
    generate_reference, is_valid_reference, ActionType, CheckoutGateway, CheckoutRequest,
    CheckoutSession, Ledger, LedgerStore, PaymentError, SessionRecord, WebhookHandler,
    MAX_REFERENCE_LEN, META_ACTION_TYPE, META_REF_ID, META_VOICE,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn payment_error(err: PaymentError) -> ApiError {
    match &err {
        PaymentError::InvalidRequest(msg) => {
            api_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
        }
        PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => {
            tracing::warn!("Webhook rejected: {}", err);
            api_error(StatusCode::BAD_REQUEST, "INVALID_WEBHOOK", err.to_string())
        }
        PaymentError::DailyLimit { .. } => {
            api_error(StatusCode::TOO_MANY_REQUESTS, "DAILY_LIMIT", err.user_message())
        }
        PaymentError::Config(_) => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED", err.user_message())
        }
        PaymentError::Stripe(_) | PaymentError::Storage(_) => {
            tracing::error!("Payment error: {}", err);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "PAYMENT_ERROR", err.user_message())
        }
    }
}

fn core_error(err: CoreError) -> ApiError {
    let (status, code) = match &err {
        CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        CoreError::TrialActive(_) | CoreError::TrialCapacity(_) => {
            (StatusCode::TOO_MANY_REQUESTS, "TRIAL_UNAVAILABLE")
        }
        CoreError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "ASSISTANT_DISABLED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "ASSISTANT_ERROR"),
    };
    if status.is_server_error() {
        tracing::error!("Assistant error: {}", err);
    } else {
        tracing::debug!("Request refused: {}", err);
    }
    api_error(status, code, err.user_message())
}

fn payments_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "PAYMENTS_DISABLED",
        "Payments not configured",
    )
}

fn assistant_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "ASSISTANT_DISABLED",
        "Assistant not configured",
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    pub payments_configured: bool,
    pub assistant_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutBody {
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VipCheckoutBody {
    pub step: String,
    #[serde(default, rename = "ref", alias = "refId")]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VipCheckoutResponse {
    pub url: String,
    pub ref_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct AiResponseBody {
    pub prompt: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AiResponse {
    pub audio_url: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateAudioBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateAudioResponse {
    pub success: bool,
    pub audio_url: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FreeSessionBody {
    pub identifier: String,
    #[serde(default)]
    pub mood: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeSessionResponse {
    pub session_type: &'static str,
    pub mood: Mood,
    pub audio_url: String,
    pub duration_ms: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub mood: Mood,
    pub audio: String,
    pub vip_audio: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    pub text: String,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    pub category: EmotionCategory,
    pub audio: &'static str,
    pub binaural_hz: [u8; 2],
    pub vibration_pattern: &'static [u32],
    pub guidance: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ToneResponse {
    pub frequency: u32,
    pub sample: Option<String>,
    pub sampled: &'static [u32],
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let assistant_configured = match &state.assistant {
        Some(assistant) => assistant.health_check().await,
        None => false,
    };

    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.checkout.is_some() && state.webhook_secret.is_some(),
        assistant_configured,
    })
}

/// Reject checkout creation once `email` hit today's cap
fn check_daily_limit(state: &AppState, email: Option<&str>) -> Result<(), ApiError> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(());
    };

    let limit = state.config.daily_session_limit;
    let count = state
        .ledger
        .snapshot()
        .map_err(payment_error)?
        .daily_count(Utc::now().date_naive(), email);

    if count >= limit {
        tracing::info!(user_key = %email, count, limit, "Daily session limit reached");
        return Err(payment_error(PaymentError::DailyLimit {
            user_key: email.to_string(),
            count,
            limit,
        }));
    }
    Ok(())
}

fn gateway(state: &AppState) -> Result<&Arc<dyn CheckoutGateway>, ApiError> {
    state.checkout.as_ref().ok_or_else(payments_disabled)
}

/// Create a hosted checkout session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateCheckoutBody>,
) -> Result<Json<CheckoutSession>, ApiError> {
    if payload.amount <= 0 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            format!("amount must be positive, got {}", payload.amount),
        ));
    }
    check_daily_limit(&state, payload.email.as_deref())?;
    let gateway = gateway(&state)?;

    let metadata: HashMap<String, String> = payload
        .metadata
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();
    let description = payload.description.unwrap_or_else(|| {
        metadata
            .get(META_ACTION_TYPE)
            .map_or("Frecuencia Central", |a| ActionType::parse(a).default_description())
            .to_string()
    });

    let request = CheckoutRequest {
        amount: payload.amount,
        currency: payload
            .currency
            .unwrap_or_else(|| state.config.default_currency.clone())
            .to_lowercase(),
        description,
        metadata,
        customer_email: payload.email,
        success_url: state.config.success_url(),
        cancel_url: state.config.cancel_url(),
    };

    let session = gateway
        .create_checkout_session(request)
        .await
        .map_err(payment_error)?;

    Ok(Json(session))
}

/// Open one half of a two-step VIP purchase
pub async fn create_vip_checkout(
    State(state): State<AppState>,
    Json(payload): Json<VipCheckoutBody>,
) -> Result<Json<VipCheckoutResponse>, ApiError> {
    let supplied = payload
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    if let Some(reference) = supplied.filter(|r| !is_valid_reference(r)) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_REF",
            format!(
                "ref must be 1-{MAX_REFERENCE_LEN} letters, digits, '_' or '-', got {:?}",
                reference.chars().take(MAX_REFERENCE_LEN).collect::<String>()
            ),
        ));
    }

    let (action, reference) = match payload.step.trim() {
        "initial" => {
            if let Some(reference) = supplied {
                let ledger = state.ledger.snapshot().map_err(payment_error)?;
                if ledger.find_vip(reference).is_some() {
                    return Err(api_error(
                        StatusCode::CONFLICT,
                        "REF_IN_USE",
                        format!("VIP reference {reference} is already in use"),
                    ));
                }
            }
            (
                ActionType::VipInitial,
                supplied.map_or_else(generate_reference, str::to_string),
            )
        }
        "donation" => {
            let reference = supplied.ok_or_else(|| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    "MISSING_REF",
                    "ref is required to complete a VIP session",
                )
            })?;
            (ActionType::VipDonation, reference.to_string())
        }
        other => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_STEP",
                format!("unknown VIP step: {other}"),
            ));
        }
    };

    let amount = match payload.amount {
        Some(amount) if amount <= 0 => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                format!("amount must be positive, got {amount}"),
            ));
        }
        Some(amount) => amount,
        None => action.default_amount().unwrap_or(0),
    };
    let gateway = gateway(&state)?;

    let voice = payload.voice.as_deref().map_or_else(Voice::default, Voice::parse);
    let metadata = HashMap::from([
        (META_ACTION_TYPE.to_string(), action.as_str().to_string()),
        (META_REF_ID.to_string(), reference.clone()),
        (META_VOICE.to_string(), voice.as_str().to_string()),
    ]);

    let request = CheckoutRequest {
        amount,
        currency: state.config.default_currency.clone(),
        description: action.default_description().to_string(),
        metadata,
        customer_email: None,
        success_url: format!("{}&ref={reference}", state.config.success_url()),
        cancel_url: state.config.cancel_url(),
    };

    let session = gateway
        .create_checkout_session(request)
        .await
        .map_err(payment_error)?;

    tracing::info!(ref_id = %reference, step = %action, amount, "Created VIP checkout");

    Ok(Json(VipCheckoutResponse {
        url: session.url,
        ref_id: reference,
    }))
}

/// Stripe webhook receiver
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    let secret = state.webhook_secret.as_deref().ok_or_else(payments_disabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "MISSING_SIGNATURE",
                "Missing Stripe signature",
            )
        })?;

    let handler = WebhookHandler::new(Arc::clone(&state.ledger));
    let event = handler
        .parse_event(&body, signature, secret)
        .map_err(payment_error)?;

    // Reconciling writes the ledger file; keep that off the async workers
    tokio::task::spawn_blocking(move || handler.handle(event))
        .await
        .map_err(|e| {
            tracing::error!("Webhook task failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "WEBHOOK_ERROR",
                "Webhook processing failed",
            )
        })?
        .map_err(payment_error)?;

    Ok(Json(WebhookAck { received: true }))
}

/// Generate a spoken reply to the user's prompt
pub async fn ai_response(
    State(state): State<AppState>,
    Json(payload): Json<AiResponseBody>,
) -> Result<Json<AiResponse>, ApiError> {
    let assistant = state.assistant.as_ref().ok_or_else(assistant_disabled)?;
    let voice = payload.voice.as_deref().map_or_else(Voice::default, Voice::parse);

    let reply = assistant
        .reply(&payload.prompt, voice)
        .await
        .map_err(core_error)?;
    let audio_url = state.clips.save(&reply.audio).await.map_err(core_error)?;

    tracing::info!(provider = assistant.name(), %voice, %audio_url, "Generated AI response");

    Ok(Json(AiResponse {
        audio_url,
        text: reply.text,
    }))
}

/// Read the given text aloud
pub async fn generate_audio(
    State(state): State<AppState>,
    Json(payload): Json<GenerateAudioBody>,
) -> Result<Json<GenerateAudioResponse>, ApiError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "text is required",
        ));
    }
    let assistant = state.assistant.as_ref().ok_or_else(assistant_disabled)?;
    let voice = payload.voice.as_deref().map_or_else(Voice::default, Voice::parse);

    let audio = assistant
        .synthesize(&SpeechRequest::new(text, voice))
        .await
        .map_err(core_error)?;
    if audio.is_empty() {
        return Err(core_error(CoreError::Provider("no audio received".into())));
    }
    let audio_url = state.clips.save(&audio).await.map_err(core_error)?;

    Ok(Json(GenerateAudioResponse {
        success: true,
        audio_url,
        text: text.to_string(),
    }))
}

/// Start a gated free session
pub async fn free_session(
    State(state): State<AppState>,
    Json(payload): Json<FreeSessionBody>,
) -> Result<Json<FreeSessionResponse>, ApiError> {
    let admission = state
        .trials
        .try_admit(&payload.identifier, Utc::now())
        .map_err(core_error)?;
    let mood = payload.mood.as_deref().map_or_else(Mood::default, Mood::parse);

    tracing::info!(
        identifier = %admission.identifier,
        %mood,
        expires_at = %admission.expires_at,
        "Admitted free session"
    );

    Ok(Json(FreeSessionResponse {
        session_type: "free",
        mood,
        audio_url: mood.audio_url(SessionTier::Free),
        duration_ms: state.trials.config().window.num_milliseconds(),
        expires_at: admission.expires_at,
    }))
}

/// Mood catalog
pub async fn list_moods() -> Json<Vec<MoodEntry>> {
    Json(
        Mood::ALL
            .iter()
            .map(|mood| MoodEntry {
                mood: *mood,
                audio: mood.audio_url(SessionTier::Free),
                vip_audio: mood.audio_url(SessionTier::Vip),
            })
            .collect(),
    )
}

/// Map free text to a sound profile
pub async fn classify(
    State(state): State<AppState>,
    Json(payload): Json<ClassifyBody>,
) -> Json<ClassifyResponse> {
    let category = state.classifier.classify(&payload.text);
    let profile = category.profile();
    let locale = Locale::parse(payload.lang.as_deref().unwrap_or("es"));

    Json(ClassifyResponse {
        category,
        audio: profile.audio,
        binaural_hz: [profile.binaural_hz.0, profile.binaural_hz.1],
        vibration_pattern: profile.vibration_pattern,
        guidance: profile.guidance(locale),
    })
}

/// Pre-recorded sample for a solfeggio frequency, if any
pub async fn tone_sample(Path(frequency): Path<u32>) -> Json<ToneResponse> {
    Json(ToneResponse {
        frequency,
        sample: sample_for(frequency),
        sampled: &SAMPLED_FREQUENCIES,
    })
}

/// Paid session lookup by record id or Stripe session id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let ledger = state.ledger.snapshot().map_err(payment_error)?;
    let record = ledger.find_session(&id).cloned().ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "SESSION_NOT_FOUND",
            format!("no session {id}"),
        )
    })?;

    let active = record.is_active(Utc::now());
    Ok(Json(SessionStatus { record, active }))
}

/// Full ledger dump
pub async fn admin_db(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Ledger>, ApiError> {
    if let Some(token) = state.config.admin_token.as_deref() {
        let supplied = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if !supplied.is_some_and(|s| tokens_match(s, token)) {
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Admin token required",
            ));
        }
    }

    state.ledger.snapshot().map(Json).map_err(payment_error)
}

/// Compare two secrets in constant time
fn tokens_match(supplied: &str, expected: &str) -> bool {
    supplied.len() == expected.len()
        && bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cres", "s3cret"));
        assert!(!tokens_match("s3cret-longer", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
    }
}
