//! Google sign-in (authorization code flow).
//!
//! `/auth/google` redirects to the consent screen with a one-time `state`
//! kept in [`StateCache`]. The callback checks the state, trades the code
//! for the Google profile, then signs in the account with that email or
//! creates a user with placeholder profile fields.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::{self, AuthError, TokenKeys};
use crate::config::GoogleConfig;
use crate::db::{self, NewUser};
use crate::models::{AccountKind, Address};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// How long a consent redirect stays redeemable.
const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Google sign-in is not configured")]
    NotConfigured,
    #[error("Invalid or expired sign-in state")]
    InvalidState,
    #[error("Google sign-in was cancelled: {0}")]
    Denied(String),
    #[error("Google request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google profile has no verified email")]
    MissingEmail,
    #[error(transparent)]
    Auth(#[from] AuthError),
}

// ═══════════════════════════════════════════════════════════
// State cache
// ═══════════════════════════════════════════════════════════

/// One-time `state` values handed out with consent redirects.
pub struct StateCache {
    issued: HashMap<String, Instant>,
    ttl: Duration,
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            issued: HashMap::new(),
            ttl: STATE_TTL,
        }
    }

    pub fn issue(&mut self) -> String {
        if self.issued.len() > 1000 {
            self.cleanup();
        }
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        self.issued.insert(state.clone(), Instant::now());
        state
    }

    /// Redeem a state. Each value works once, and only within the TTL.
    pub fn consume(&mut self, state: &str) -> bool {
        match self.issued.remove(state) {
            Some(at) => at.elapsed() < self.ttl,
            None => false,
        }
    }

    fn cleanup(&mut self) {
        let ttl = self.ttl;
        self.issued.retain(|_, at| at.elapsed() < ttl);
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Google endpoints
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
}

/// Code exchange plus profile fetch.
#[async_trait]
pub trait GoogleIdentity: Send + Sync {
    async fn profile_for_code(&self, code: &str) -> Result<GoogleProfile, OAuthError>;
}

/// Consent screen URL for a freshly issued `state`.
pub fn authorize_url(
    http: &reqwest::Client,
    config: &GoogleConfig,
    state: &str,
) -> Result<String, OAuthError> {
    let request = http
        .get(AUTHORIZE_URL)
        .query(&[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
            ("prompt", "select_account"),
        ])
        .build()?;
    Ok(request.url().to_string())
}

pub struct GoogleClient {
    http: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, config: GoogleConfig) -> Self {
        Self { http, config }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl GoogleIdentity for GoogleClient {
    async fn profile_for_code(&self, code: &str) -> Result<GoogleProfile, OAuthError> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let profile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile)
    }
}

// ═══════════════════════════════════════════════════════════
// Sign-in
// ═══════════════════════════════════════════════════════════

const PLACEHOLDER_PHONE: &str = "0000000000";
const PLACEHOLDER_TEXT: &str = "Unknown";
const PLACEHOLDER_POSTAL_CODE: &str = "000000";

/// Token for the account matching the Google email; users win over
/// hospitals. Unknown emails get a new user account.
pub fn sign_in(
    conn: &Connection,
    keys: &TokenKeys,
    profile: &GoogleProfile,
) -> Result<(AccountKind, String), OAuthError> {
    let email = match profile.email.as_deref() {
        Some(email) if profile.email_verified && !email.trim().is_empty() => {
            auth::normalize_email(email)
        }
        _ => return Err(OAuthError::MissingEmail),
    };

    for kind in [AccountKind::User, AccountKind::Hospital] {
        if let Some(creds) = db::get_credentials_by_email(conn, kind, &email).map_err(AuthError::from)? {
            tracing::info!(kind = kind.as_str(), account_id = %creds.id, "Google sign-in");
            return Ok((kind, keys.issue(&creds.id, kind)?));
        }
    }

    // Password login stays impossible until the user resets it.
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let password = base64::engine::general_purpose::STANDARD.encode(secret);

    let name = profile
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Google User");
    let user = db::insert_user(
        conn,
        &NewUser {
            name: name.to_string(),
            email,
            password_hash: auth::hash_password(&password)?,
            phone: PLACEHOLDER_PHONE.into(),
            dob: None,
            gender: None,
            address: Address {
                street: PLACEHOLDER_TEXT.into(),
                city: PLACEHOLDER_TEXT.into(),
                state: PLACEHOLDER_TEXT.into(),
                postal_code: PLACEHOLDER_POSTAL_CODE.into(),
            },
            medical_history: Vec::new(),
        },
    )
    .map_err(AuthError::from)?;
    tracing::info!(user_id = %user.id, "User created from Google sign-in");
    Ok((AccountKind::User, keys.issue(&user.id, AccountKind::User)?))
}

/// Page loaded in the sign-in popup: hands the token to the opener and closes.
pub fn callback_page(token: &str, frontend_url: &str) -> String {
    // `<\/` keeps JSON string values from closing the script element.
    let js = |value: serde_json::Value| value.to_string().replace("</", "<\\/");
    let payload = js(serde_json::json!({ "token": token }));
    let origin = js(serde_json::Value::String(
        frontend_url.trim_end_matches('/').to_string(),
    ));
    format!(
        "<!DOCTYPE html><html><body><script>\
         if (window.opener) {{ window.opener.postMessage({payload}, {origin}); }}\
         window.close();\
         </script></body></html>"
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::tests::{hospital_request, user_request};
    use crate::db::sqlite::open_memory_database;

    /// Answers every code with a fixed profile.
    pub(crate) struct FakeGoogle(pub GoogleProfile);

    #[async_trait]
    impl GoogleIdentity for FakeGoogle {
        async fn profile_for_code(&self, _code: &str) -> Result<GoogleProfile, OAuthError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn profile(email: &str) -> GoogleProfile {
        GoogleProfile {
            sub: "1090".into(),
            email: Some(email.into()),
            email_verified: true,
            name: Some("Kiran Rao".into()),
        }
    }

    fn config() -> GoogleConfig {
        GoogleConfig {
            client_id: "client-1".into(),
            client_secret: "shh".into(),
            redirect_uri: "http://localhost:8081/auth/google/callback".into(),
        }
    }

    #[test]
    fn state_is_single_use() {
        let mut cache = StateCache::new();
        let state = cache.issue();
        assert!(cache.consume(&state));
        assert!(!cache.consume(&state));
        assert!(!cache.consume("forged"));
    }

    #[test]
    fn expired_state_is_rejected() {
        let mut cache = StateCache {
            issued: HashMap::new(),
            ttl: Duration::ZERO,
        };
        let state = cache.issue();
        assert!(!cache.consume(&state));
    }

    #[test]
    fn authorize_url_carries_client_and_state() {
        let url = authorize_url(&reqwest::Client::new(), &config(), "abc").unwrap();
        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("state=abc"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8081"));
    }

    #[test]
    fn existing_accounts_sign_in_by_email() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("secret");
        let user = auth::register_user(&conn, &user_request("asha@example.com")).unwrap();
        let hospital =
            auth::register_hospital(&conn, &hospital_request("desk@sahyadri.example"), None)
                .unwrap();

        let (kind, token) = sign_in(&conn, &keys, &profile("ASHA@example.com")).unwrap();
        assert_eq!(kind, AccountKind::User);
        assert_eq!(keys.verify(&token).unwrap().user.id, user.id);

        let (kind, token) = sign_in(&conn, &keys, &profile("desk@sahyadri.example")).unwrap();
        assert_eq!(kind, AccountKind::Hospital);
        assert_eq!(keys.verify(&token).unwrap().user.id, hospital.id);
    }

    #[test]
    fn unknown_email_creates_placeholder_user() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("secret");

        let (kind, token) = sign_in(&conn, &keys, &profile("new@example.com")).unwrap();
        assert_eq!(kind, AccountKind::User);
        let id = keys.verify(&token).unwrap().user.id;
        let user = db::get_user(&conn, &id).unwrap().unwrap();
        assert_eq!(user.name, "Kiran Rao");
        assert_eq!(user.phone, PLACEHOLDER_PHONE);
        assert_eq!(user.address.city, PLACEHOLDER_TEXT);

        // Second sign-in reuses the account.
        let (_, again) = sign_in(&conn, &keys, &profile("new@example.com")).unwrap();
        assert_eq!(keys.verify(&again).unwrap().user.id, id);
    }

    #[test]
    fn unverified_email_is_refused() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("secret");
        let mut p = profile("x@example.com");
        p.email_verified = false;
        assert!(matches!(
            sign_in(&conn, &keys, &p),
            Err(OAuthError::MissingEmail)
        ));
    }

    #[test]
    fn callback_page_posts_token_to_frontend() {
        let page = callback_page("tok.en", "https://med-space.vercel.app/");
        assert!(page.contains(r#"postMessage({"token":"tok.en"}, "https://med-space.vercel.app")"#));
        assert!(page.contains("window.close()"));
    }

    #[test]
    fn callback_page_cannot_be_broken_out_of() {
        let page = callback_page("</script><b>", "https://a.example");
        assert_eq!(page.matches("</script>").count(), 1);
    }
}
