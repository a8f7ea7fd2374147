//! Request and response values passed through the gateway.
//!
//! `ApiRequest` is plain data so the gateway can re-dispatch the exact same
//! request after a token refresh. `ApiResponse` holds the fully read body so
//! it can be decoded or turned into an [`ApiError`] after the fact.

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, CODE_DECODE, Failure, normalize};

// =============================================================================
// REQUEST
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// An outbound request, relative to the API base URL unless `path` is absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), headers: Vec::new(), body: RequestBody::Empty }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Serialize `body` as the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an `unknown_error` [`ApiError`] if `body` cannot be serialized.
    pub fn json_from<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| normalize(Failure::Other(format!("request body encoding failed: {e}"))))?;
        Ok(self.json(value))
    }

    #[must_use]
    pub fn form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = RequestBody::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether `path` is an absolute URL rather than an API-relative path.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with("http://") || self.path.starts_with("https://")
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A settled response with its body already read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// 2xx and 3xx count as success; redirects are followed by the client.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a `decode_error` [`ApiError`] carrying the status when the body
    /// does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::new(Some(self.status), CODE_DECODE, format!("Unexpected response body: {e}"))
        })
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body as JSON, a JSON string for non-JSON text, or `null` when empty.
    #[must_use]
    pub fn body_value(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| Value::String(self.text()))
    }

    /// Normalize this response as a failure.
    #[must_use]
    pub fn failure(&self) -> ApiError {
        normalize(Failure::Response { status: self.status, body: self.body_value() })
    }

    /// `Ok(self)` on success, the normalized failure otherwise.
    ///
    /// # Errors
    ///
    /// Returns the normalized [`ApiError`] for non-success statuses.
    pub fn settle(self) -> Result<Self, ApiError> {
        if self.is_success() { Ok(self) } else { Err(self.failure()) }
    }
}

/// Read status, headers and the full body of a transport response.
pub(crate) async fn read_response(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(ApiResponse { status, headers, body })
}
