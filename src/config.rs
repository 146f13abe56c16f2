use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MedSpace";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent to geocoding and map services.
pub const USER_AGENT: &str = concat!("MedSpace/", env!("CARGO_PKG_VERSION"), " (+https://med-space.vercel.app)");

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_FRONTEND_URL: &str = "https://med-space.vercel.app";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Origins always allowed by CORS, in addition to any `localhost` origin.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://learnstocks.netlify.app",
    "https://console.cron-job.org",
    "https://prodez-ai.netlify.app",
    "https://medi-connect-in.netlify.app",
    "https://med-space.vercel.app",
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:3002",
    "http://localhost:8080",
    "http://localhost:8081",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:3001",
];

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,medspace_lib=debug,tower_http=debug"
    } else {
        "info"
    }
}

/// Get the application data directory
/// ~/MedSpace/ when a home directory is known, ./medspace-data otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("medspace-data"))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// SMTP credentials; absent means mail is logged instead of sent.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Runtime configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub opencage_api_key: Option<String>,
    pub google: Option<GoogleConfig>,
    pub smtp: Option<SmtpConfig>,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Read from process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| app_data_dir().join("medspace.db"));

        let data_dir = get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            database_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(app_data_dir)
        });

        let google = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri: get("GOOGLE_REDIRECT_URI").unwrap_or_else(|| {
                    format!("http://localhost:{port}/auth/google/callback")
                }),
            }),
            _ => None,
        };

        let smtp = match (get("SMTP_EMAIL"), get("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => Some(SmtpConfig {
                host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                username,
                password,
            }),
            _ => None,
        };

        let mut allowed_origins: Vec<String> =
            DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(extra) = get("CORS_ORIGINS") {
            allowed_origins.extend(
                extra
                    .split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty()),
            );
        }

        Ok(Self {
            port,
            database_path,
            data_dir,
            jwt_secret,
            opencage_api_key: get("OPENCAGE_API_KEY"),
            google,
            smtp,
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            allowed_origins,
        })
    }

    /// Directory where uploaded appointment reports are written.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("uploads").join("reports")
    }
}
