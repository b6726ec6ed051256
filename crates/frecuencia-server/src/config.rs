//! Server Configuration

use std::path::PathBuf;

use frecuencia_core::TrialGateConfig;

/// Settings read from the environment at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address (`BIND_ADDR`, or `0.0.0.0:$PORT`)
    pub bind_addr: String,

    /// Static assets and generated audio
    pub public_dir: PathBuf,

    /// Ledger JSON file
    pub db_path: PathBuf,

    /// Base for checkout success/cancel redirects
    pub public_base_url: String,

    /// Currency used when a checkout request names none
    pub default_currency: String,

    /// Completed checkouts allowed per customer per day
    pub daily_session_limit: u32,

    pub trial: TrialGateConfig,

    /// Bearer token guarding `/admin/db`. Open when unset.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            public_dir: PathBuf::from("public"),
            db_path: PathBuf::from("db.json"),
            public_base_url: "http://localhost:3000".into(),
            default_currency: "eur".into(),
            daily_session_limit: 1,
            trial: TrialGateConfig::default(),
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env("BIND_ADDR") {
            config.bind_addr = addr;
        } else if let Some(port) = env("PORT") {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(dir) = env("PUBLIC_DIR") {
            config.public_dir = PathBuf::from(dir);
        }
        if let Some(path) = env("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        config.public_base_url = env("PUBLIC_BASE_URL").map_or_else(
            || {
                let port = config.bind_addr.rsplit(':').next().unwrap_or("3000");
                format!("http://localhost:{port}")
            },
            |url| url.trim_end_matches('/').to_string(),
        );
        if let Some(currency) = env("DEFAULT_CURRENCY") {
            config.default_currency = currency.to_lowercase();
        }
        if let Some(limit) = env("DAILY_SESSION_LIMIT").and_then(|l| l.parse().ok()) {
            config.daily_session_limit = limit;
        }
        if let Some(max) = env("MAX_CONCURRENT_TRIALS").and_then(|m| m.parse().ok()) {
            config.trial.max_concurrent = max;
        }
        config.admin_token = env("ADMIN_TOKEN");

        config
    }

    pub fn success_url(&self) -> String {
        format!("{}/success.html?session_id={{CHECKOUT_SESSION_ID}}", self.public_base_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/", self.public_base_url)
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.default_currency, "eur");
        assert_eq!(config.daily_session_limit, 1);
        assert_eq!(config.trial.max_concurrent, 10);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_redirect_urls() {
        let config = ServerConfig {
            public_base_url: "https://frecuencia.example".into(),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.success_url(),
            "https://frecuencia.example/success.html?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(config.cancel_url(), "https://frecuencia.example/");
    }
}
