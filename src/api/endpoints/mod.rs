//! Endpoint handlers, one module per resource.
//!
//! Handlers stay thin: they open a connection, call into the domain
//! modules (`auth`, `booking`, `profile`, `nearby`) and shape the JSON.

pub mod appointments;
pub mod auth;
pub mod health;
pub mod hospitals;
pub mod profile;
pub mod subscribe;
