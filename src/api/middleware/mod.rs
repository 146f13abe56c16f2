//! Middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. CORS and security headers (tower-http layers, see `router`)
//! 2. Access log: method, matched route, status, latency, metrics
//! 3. Rate limiter: credential endpoints only
//! 4. Auth validator: protected routes only

pub mod access;
pub mod auth;
pub mod rate;
