pub mod api;
pub mod auth;
pub mod booking;
pub mod config;
pub mod core_state;
pub mod db;
pub mod geocoding;
pub mod mailer;
pub mod metrics;
pub mod models;
pub mod nearby;
pub mod oauth;
pub mod profile;
pub mod wizard; // Registration wizard state machine

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::core_state::{CoreState, StartupError};

/// Load `.env`, initialize tracing, build the shared state and serve until
/// Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Missing .env is normal in production
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env()?;
    let core = Arc::new(CoreState::from_config(config)?);
    api::serve(core).await
}
