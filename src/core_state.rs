//! Process-wide application state.
//!
//! `CoreState` is built once at startup and shared behind an `Arc` by
//! every request. It holds no mutable data of its own: each request opens
//! its own SQLite connection through [`CoreState::open_db`].

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;

use crate::auth::TokenKeys;
use crate::config::{AppConfig, ConfigError, GoogleConfig};
use crate::db::{Database, DatabaseError};
use crate::geocoding::{self, ChainedGeocoder, Geocoder};
use crate::mailer::{LogMailer, MailError, Mailer, SmtpMailer};
use crate::metrics::Metrics;
use crate::nearby::{HospitalLocator, Overpass};
use crate::oauth::{GoogleClient, GoogleIdentity};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Database unavailable: {0}")]
    Database(#[from] DatabaseError),
    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Mail transport: {0}")]
    Mail(#[from] MailError),
    #[error("Cannot bind or serve: {0}")]
    Io(#[from] std::io::Error),
}

/// Google sign-in settings together with the client that talks to Google.
pub struct GoogleSignIn {
    pub config: GoogleConfig,
    pub identity: Arc<dyn GoogleIdentity>,
}

pub struct CoreState {
    pub config: AppConfig,
    db: Database,
    pub tokens: TokenKeys,
    pub mailer: Arc<dyn Mailer>,
    pub geocoder: Arc<dyn Geocoder>,
    pub locator: Arc<dyn HospitalLocator>,
    /// `None` when the Google client id/secret are not configured.
    pub google: Option<GoogleSignIn>,
    pub http: reqwest::Client,
    pub metrics: Metrics,
}

impl CoreState {
    /// Wire the production collaborators from configuration and bring the
    /// database schema up to date.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let db = Database::initialize(&config.database_path)?;
        let http = geocoding::http_client()?;

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => {
                tracing::info!(host = %smtp.host, "SMTP mailer configured");
                Arc::new(SmtpMailer::new(smtp)?)
            }
            None => {
                tracing::warn!("SMTP credentials missing; emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        let geocoder: Arc<dyn Geocoder> = Arc::new(ChainedGeocoder::from_config(
            http.clone(),
            config.opencage_api_key.clone(),
        ));

        let google = config.google.clone().map(|google| GoogleSignIn {
            identity: Arc::new(GoogleClient::new(http.clone(), google.clone())),
            config: google,
        });
        if google.is_none() {
            tracing::info!("Google sign-in disabled");
        }

        Ok(Self {
            tokens: TokenKeys::new(&config.jwt_secret),
            db,
            mailer,
            geocoder,
            locator: Arc::new(Overpass::new(http.clone())),
            google,
            http,
            metrics: Metrics::new()?,
            config,
        })
    }

    /// Fresh connection for the current request.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        self.db.open()
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.config.reports_dir()
    }
}
