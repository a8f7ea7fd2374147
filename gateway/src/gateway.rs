//! Authenticated HTTP gateway with transparent token refresh.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every business call goes through [`HttpGateway::send`]. The gateway owns
//! the shared `reqwest::Client` and borrows the session for the current
//! credentials and for the refresh exchange.
//!
//! REFRESH PROTOCOL
//! ================
//! 1. Attach `Authorization: Bearer <access>` when the store holds an access
//!    entry whose attributes allow this URL.
//! 2. Anything but 401 settles immediately: 2xx/3xx as `Ok`, the rest
//!    normalized into `Err`.
//! 3. On the first 401 mark the request as retried and ask the session to
//!    refresh. On success re-dispatch once with the new bearer; on a second
//!    401 give up.
//! 4. When the refresh fails for any reason the session has already logged
//!    out and the caller gets the original 401.
//!
//! Concurrent requests that expire together each refresh on their own; the
//! last writer's pair wins in the store.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;

use std::net::IpAddr;
use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::Instrument as _;
use uuid::Uuid;

use crate::auth::HttpAuthEndpoints;
use crate::config::{ConfigError, GatewayConfig};
use crate::credentials::{CredentialStore, SameSite, StoredCredential};
use crate::error::{ApiError, Failure, normalize};
use crate::http::{ApiRequest, ApiResponse, RequestBody, read_response};
use crate::session::Session;

/// One dispatch of an [`ApiRequest`], carrying the retry marker.
#[derive(Debug)]
struct PendingRequest {
    id: Uuid,
    request: ApiRequest,
    url: Url,
    retried: bool,
    bearer: Option<String>,
}

pub struct HttpGateway {
    http: reqwest::Client,
    config: GatewayConfig,
    api_url: Url,
    session: Arc<Session>,
}

impl HttpGateway {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] when `config.api_url` does not parse.
    pub fn new(http: reqwest::Client, config: GatewayConfig, session: Arc<Session>) -> Result<Self, ConfigError> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| ConfigError::InvalidUrl { url: config.api_url.clone(), reason: e.to_string() })?;
        Ok(Self { http, config, api_url, session })
    }

    /// Build the client, hydrate a session from `store` and wire both together.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the HTTP client cannot be built or the API
    /// URL is invalid.
    pub fn connect(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ConfigError> {
        let http = config.http_client()?;
        let auth = Arc::new(HttpAuthEndpoints::new(http.clone(), config.clone()));
        let session = Arc::new(Session::hydrate(store, auth));
        Self::new(http, config, session)
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Send `request`, refreshing credentials once on a 401.
    ///
    /// # Errors
    ///
    /// Returns the normalized [`ApiError`] for any terminal failure.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.resolve(&request)?;
        let pending = PendingRequest {
            id: Uuid::new_v4(),
            bearer: self.bearer_for(&url),
            request,
            url,
            retried: false,
        };
        let span = tracing::debug_span!(
            "request",
            request_id = %pending.id,
            method = %pending.request.method,
            path = %pending.request.path,
        );
        self.drive(pending).instrument(span).await
    }

    async fn drive(&self, mut pending: PendingRequest) -> Result<ApiResponse, ApiError> {
        loop {
            let response = self.dispatch(&pending).await?;
            if response.status != 401 {
                return response.settle();
            }
            if pending.retried {
                tracing::debug!("gateway: 401 after refresh, not retrying");
                return Err(response.failure());
            }

            pending.retried = true;
            tracing::debug!("gateway: refreshing after 401");
            match self.session.refresh_token().await {
                Ok(pair) => pending.bearer = self.attaches_to(&pending.url).then_some(pair.access),
                Err(error) => {
                    tracing::info!(code = %error.code, "gateway: refresh failed, returning original 401");
                    return Err(response.failure());
                }
            }
        }
    }

    async fn dispatch(&self, pending: &PendingRequest) -> Result<ApiResponse, ApiError> {
        let request = &pending.request;
        let mut builder = self.http.request(request.method.clone(), pending.url.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &pending.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        tracing::debug!(retried = pending.retried, authenticated = pending.bearer.is_some(), "gateway: dispatch");
        let response = builder.send().await.map_err(|e| {
            let error = ApiError::from(e);
            tracing::debug!(code = %error.code, "gateway: transport failure");
            error
        })?;
        let response = read_response(response).await?;
        tracing::debug!(status = response.status, "gateway: response");
        Ok(response)
    }

    fn resolve(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let raw = if request.is_absolute() { request.path.clone() } else { self.config.endpoint(&request.path) };
        Url::parse(&raw).map_err(|e| normalize(Failure::Other(format!("invalid request URL '{raw}': {e}"))))
    }

    // =========================================================================
    // CREDENTIAL ATTACHMENT
    // =========================================================================

    /// The access token to send to `url`, if the stored entry allows it.
    fn bearer_for(&self, url: &Url) -> Option<String> {
        let entry = self.session.credentials().entries().access?;
        if self.may_attach(&entry, url) {
            Some(entry.value)
        } else {
            tracing::debug!(host = ?url.host_str(), "gateway: credential attributes exclude target");
            None
        }
    }

    /// Whether the stored access entry's attributes allow sending to `url`.
    /// Only the attributes are read; the token value comes from the caller.
    fn attaches_to(&self, url: &Url) -> bool {
        self.session.credentials().read_entries().access.is_some_and(|entry| self.may_attach(&entry, url))
    }

    fn may_attach(&self, entry: &StoredCredential, url: &Url) -> bool {
        if entry.secure && url.scheme() != "https" && !is_loopback(url) {
            return false;
        }
        match entry.same_site {
            SameSite::Strict => url.origin() == self.api_url.origin(),
            SameSite::Lax => url.host_str() == self.api_url.host_str(),
            SameSite::None => true,
        }
    }

    // =========================================================================
    // CONVENIENCE
    // =========================================================================

    /// `GET` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure, or `decode_error` when the body does
    /// not match `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// `POST` a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Same as [`HttpGateway::get_json`].
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json_from(body)?).await?.json()
    }

    /// `PUT` a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Same as [`HttpGateway::get_json`].
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json_from(body)?).await?.json()
    }

    /// `PATCH` a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Same as [`HttpGateway::get_json`].
    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json_from(body)?).await?.json()
    }

    /// # Errors
    ///
    /// Returns the normalized failure.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}
