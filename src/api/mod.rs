//! HTTP surface of MedSpace.
//!
//! Routes live at the root (`/auth`, `/hospitalapi`, `/otherroutes`,
//! `/profile`, `/ping`). Credential endpoints are rate limited and
//! account endpoints require a bearer token or `x-auth-token`.
//!
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server instance; `server` binds it to a port.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, start_on, ApiServer};
pub use types::ApiContext;
