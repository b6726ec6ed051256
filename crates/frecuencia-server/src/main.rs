//! Frecuencia Central server binary
//!
//! Loads configuration, wires the optional Stripe and Gemini backends and
//! serves the router until Ctrl-C or SIGTERM, then flushes the ledger.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frecuencia_core::AssistantProvider;
use frecuencia_payments::{JsonFileLedgerStore, LedgerStore, StripeClient};
use frecuencia_runtime::GeminiProvider;
use frecuencia_server::{build_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let ledger = Arc::new(JsonFileLedgerStore::open(&config.db_path)?);
    let mut state = AppState::new(config.clone(), Arc::clone(&ledger));

    // Payments
    match StripeClient::from_env() {
        Ok(stripe) => {
            let secret = stripe.webhook_secret().to_string();
            state = state.with_checkout(Arc::new(stripe), secret);
            tracing::info!("✓ Stripe configured");
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
        }
    }

    // Assistant
    match GeminiProvider::from_env() {
        Ok(provider) => {
            tracing::info!(model = %provider.config().model, "✓ {} configured", provider.name());
            state = state.with_assistant(Arc::new(provider));
        }
        Err(e) => {
            tracing::warn!("⚠ Assistant not configured - AI replies disabled ({})", e);
            tracing::warn!("  Set GEMINI_API_KEY in .env");
        }
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🎧 Frecuencia Central running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("  Public dir: {}", config.public_dir.display());
    tracing::info!("  Ledger:     {}", config.db_path.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ledger.flush()?;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, flushing ledger");
}
