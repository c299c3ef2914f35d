//! Zoho Projects API access layer.
//!
//! - `auth` - OAuth token store with silent refresh and a single refresh
//!   critical section shared by all concurrent turns
//! - `transport` - the HTTP seam (`Transport` trait + reqwest impl)
//! - `client` - typed per-resource operations with bounded pagination,
//!   one forced-refresh auth retry, and one transient retry
//! - `models` - light serde views of the entities operations need
//!
//! All failures surface as [`projbot_core::errors::ApiError`]; retry policy
//! beyond the single built-in retries belongs to the orchestrator.

pub mod auth;
pub mod client;
pub mod models;
pub mod transport;
