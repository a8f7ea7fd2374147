//! # portal-gateway
//!
//! Authenticated HTTP client for the portal backend: session state, credential
//! persistence, transparent access-token refresh and a single canonical error
//! shape for every failure.
//!
//! ARCHITECTURE
//! ============
//! - [`gateway::HttpGateway`] sends every business request, attaching the
//!   bearer token and refreshing once on a 401.
//! - [`session::Session`] holds the credential pair and decoded identity and
//!   performs login, logout and refresh.
//! - [`credentials::CredentialStore`] persists both tokens together.
//! - [`error::normalize`] is the only place transport and server failures turn
//!   into [`error::ApiError`].
//! - [`guard::RouteGuard`] answers "may this screen render?" from the session.

pub mod account;
pub mod auth;
pub mod claims;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod http;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{GatewayConfig, Site};
pub use credentials::{CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::ApiError;
pub use gateway::HttpGateway;
pub use http::{ApiRequest, ApiResponse};
pub use session::Session;
