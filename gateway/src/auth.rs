//! Credential-issuing endpoints: login, refresh, Google login, registration.
//!
//! ARCHITECTURE
//! ============
//! These calls go straight to the HTTP client instead of through
//! [`crate::gateway::HttpGateway`]. They never carry a bearer token and a
//! 401 from them must not start another refresh, so they sit outside the
//! refresh protocol. The session talks to them through the [`AuthEndpoints`]
//! trait so tests can substitute a scripted backend.

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

use serde::Serialize;

use crate::config::{GOOGLE_LOGIN_PATH, GatewayConfig, REFRESH_PATH, REGISTER_PATH};
use crate::credentials::CredentialPair;
use crate::error::ApiError;
use crate::http::{ApiResponse, read_response};

/// Email/password pair submitted by the login form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

/// Customer sign-up payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Backend calls that issue or exchange credentials. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthEndpoints: Send + Sync {
    /// Exchange email and password for a credential pair.
    async fn login(&self, credentials: &LoginCredentials) -> Result<CredentialPair, ApiError>;

    /// Exchange a refresh token for a new credential pair.
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ApiError>;

    /// Exchange a Google OAuth access token for a credential pair.
    async fn google_login(&self, access_token: &str) -> Result<CredentialPair, ApiError>;

    /// Create a customer account. Does not log in.
    async fn register(&self, registration: &Registration) -> Result<(), ApiError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

/// [`AuthEndpoints`] against the real backend.
pub struct HttpAuthEndpoints {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl HttpAuthEndpoints {
    #[must_use]
    pub fn new(http: reqwest::Client, config: GatewayConfig) -> Self {
        Self { http, config }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse, ApiError> {
        let response = read_response(request.send().await?).await?;
        response.settle()
    }
}

#[async_trait::async_trait]
impl AuthEndpoints for HttpAuthEndpoints {
    async fn login(&self, credentials: &LoginCredentials) -> Result<CredentialPair, ApiError> {
        let url = self.config.endpoint(self.config.site.login_path());
        let request = self.http.post(url).form(credentials);
        self.send(request).await?.json()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ApiError> {
        let url = self.config.endpoint(REFRESH_PATH);
        let request = self
            .http
            .post(url)
            .json(&serde_json::json!({ "refresh": refresh_token }));
        self.send(request).await?.json()
    }

    async fn google_login(&self, access_token: &str) -> Result<CredentialPair, ApiError> {
        let url = self.config.endpoint(GOOGLE_LOGIN_PATH);
        let request = self
            .http
            .post(url)
            .json(&serde_json::json!({ "access_token": access_token }));
        self.send(request).await?.json()
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let url = self.config.endpoint(REGISTER_PATH);
        self.send(self.http.post(url).json(registration)).await?;
        Ok(())
    }
}
