//! Shared types for the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

use crate::api::error::ApiError;
use crate::auth::Caller;
use crate::core_state::CoreState;
use crate::models::AccountKind;
use crate::oauth::StateCache;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes and middleware.
/// Wraps `CoreState` plus the in-process caches of the HTTP layer.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub oauth_states: Arc<Mutex<StateCache>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
            oauth_states: Arc::new(Mutex::new(StateCache::new())),
        }
    }

    /// Resolve the token holder into a [`Caller`] (adds the admin flag).
    pub fn caller(&self, user: &AuthUser) -> Result<Caller, ApiError> {
        let conn = self.core.open_db()?;
        Ok(Caller::resolve(
            &conn,
            &crate::auth::ClaimUser {
                id: user.id.clone(),
                kind: user.kind,
            },
        )?)
    }
}

// ═══════════════════════════════════════════════════════════
// Authenticated account: injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Account behind a valid token, injected into request extensions by
/// the auth middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub kind: AccountKind,
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: per-client sliding window
// ═══════════════════════════════════════════════════════════

/// Per-client rate limiter with per-minute and per-hour limits.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
    per_hour: u32,
}

impl RateLimiter {
    /// Limits for credential endpoints: 10 per minute, 100 per hour.
    pub fn new() -> Self {
        Self::with_limits(10, 100)
    }

    pub fn with_limits(per_minute: u32, per_hour: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
            per_hour,
        }
    }

    /// Check if a client is within rate limits. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, client: &str) -> Result<(), u64> {
        let now = Instant::now();
        if self.windows.len() > 10_000 {
            self.windows.retain(|_, entries| {
                entries
                    .last()
                    .is_some_and(|ts| now.duration_since(*ts) < Duration::from_secs(3600))
            });
        }
        let entries = self.windows.entry(client.to_string()).or_default();

        entries.retain(|ts| now.duration_since(*ts) < Duration::from_secs(3600));

        let last_minute = entries
            .iter()
            .filter(|ts| now.duration_since(**ts) < Duration::from_secs(60))
            .count() as u32;
        if last_minute >= self.per_minute {
            return Err(60);
        }

        if entries.len() as u32 >= self.per_hour {
            return Err(3600);
        }

        entries.push(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Plain acknowledgement body
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Validated JSON body
// ═══════════════════════════════════════════════════════════

/// `Json<T>` that also runs `validator` rules. Malformed bodies and rule
/// violations are both 400.
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_ten_per_minute() {
        let mut limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.check("203.0.113.7").is_ok());
        }
        assert_eq!(limiter.check("203.0.113.7"), Err(60));
    }

    #[test]
    fn rate_limiter_tracks_clients_separately() {
        let mut limiter = RateLimiter::with_limits(1, 100);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn hourly_limit_applies() {
        let mut limiter = RateLimiter::with_limits(100, 3);
        for _ in 0..3 {
            limiter.check("c").unwrap();
        }
        assert_eq!(limiter.check("c"), Err(3600));
    }
}
