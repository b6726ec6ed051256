//! Frecuencia Central HTTP Server
//!
//! Axum router exposing checkout, webhook, assistant and session endpoints,
//! with everything else served from the public directory.

pub mod config;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    admin_db, ai_response, classify, create_checkout_session, create_vip_checkout, free_session,
    generate_audio, get_session, health_check, list_moods, stripe_webhook, tone_sample,
};

pub use crate::config::ServerConfig;
pub use crate::state::AppState;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = ServeDir::new(&state.config.public_dir);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/moods", get(list_moods))
        .route("/classify", post(classify))
        .route("/tones/{frequency}", get(tone_sample))

        // Sessions
        .route("/free-session", post(free_session))
        .route("/sessions/{id}", get(get_session))

        // Assistant
        .route("/ai-response", post(ai_response))
        .route("/api/generate-audio", post(generate_audio))

        // Payments
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/create-vip-checkout", post(create_vip_checkout))
        .route("/webhook", post(stripe_webhook))

        // Admin
        .route("/admin/db", get(admin_db))

        // Static files
        .fallback_service(public)

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
