//! Canonical API error shape and the normalizer that produces it.
//!
//! DESIGN
//! ======
//! Everything that can go wrong between a caller and the backend is folded
//! into one [`ApiError`]. Typed failures enter through [`normalize`]; untyped
//! JSON (hand-built errors, payloads read back from storage) enters through
//! [`normalize_value`]. Both are total: they never panic and never return a
//! raw transport error.
//!
//! ERROR HANDLING
//! ==============
//! Callers branch on `code` (or on [`ApiError::kind`]), never on transport
//! specifics. Already-canonical inputs pass through unchanged, so normalizing
//! twice is harmless.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// CODES
// =============================================================================

pub const CODE_CANCELED: &str = "canceled";
pub const CODE_NETWORK: &str = "network_error";
pub const CODE_SERVER: &str = "server_error";
pub const CODE_API: &str = "api_error";
pub const CODE_UNKNOWN: &str = "unknown_error";
pub const CODE_TOKEN_REFRESH_FAILED: &str = "token_refresh_failed";
pub const CODE_INVALID_TOKEN: &str = "invalid_token";
pub const CODE_DECODE: &str = "decode_error";

const MESSAGE_CANCELED: &str = "Request Canceled";
const MESSAGE_NETWORK: &str = "Network error.";

/// Connection-failure codes reported by HTTP clients in place of a response.
const NETWORK_CODES: [&str; 3] = ["ECONNREFUSED", "ERR_CONNECTION_REFUSED", "ERR_NETWORK"];

/// Field name -> validation messages, as returned by form endpoints.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

// =============================================================================
// API ERROR
// =============================================================================

/// The single failure shape every gateway consumer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status, or `None` when no response was received.
    pub status: Option<u16>,
    /// Grepable machine code (`network_error`, `api_error`, ...).
    pub code: String,
    /// Human-readable message, safe to show in an alert.
    pub message: String,
    /// Per-field validation messages, when the server sent any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

/// Coarse classification of an [`ApiError`] for UI decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response reached the client.
    Network,
    /// 5xx or a response without any structured detail.
    Server,
    /// 4xx with structured detail.
    Api,
    /// Response carried a per-field error map.
    Validation,
    /// Superseded request; never shown to the user.
    Canceled,
    /// Catch-all for values the normalizer could not recognize.
    Unknown,
}

impl ApiError {
    pub fn new(status: Option<u16>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into(), errors: None }
    }

    #[must_use]
    pub fn network() -> Self {
        Self::new(None, CODE_NETWORK, MESSAGE_NETWORK)
    }

    #[must_use]
    pub fn canceled() -> Self {
        Self::new(None, CODE_CANCELED, MESSAGE_CANCELED)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(None, CODE_UNKNOWN, message)
    }

    #[must_use]
    pub fn with_errors(mut self, errors: FieldErrors) -> Self {
        self.errors = Some(errors);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.code.as_str() {
            CODE_NETWORK => ErrorKind::Network,
            CODE_CANCELED => ErrorKind::Canceled,
            CODE_UNKNOWN => ErrorKind::Unknown,
            CODE_SERVER => ErrorKind::Server,
            _ if self.status.is_some_and(|s| s >= 500) => ErrorKind::Server,
            _ if self.errors.as_ref().is_some_and(|e| !e.is_empty()) => ErrorKind::Validation,
            _ => ErrorKind::Api,
        }
    }

    /// Cancellations are suppressed from the UI.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }

    /// Validation messages for a single form field.
    #[must_use]
    pub fn field_errors(&self, field: &str) -> &[String] {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get(field))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        normalize(Failure::from(error))
    }
}

// =============================================================================
// FAILURE INPUTS
// =============================================================================

/// A failure as observed at the transport edge, before normalization.
#[derive(Debug)]
pub enum Failure {
    /// An error that is already canonical.
    Canonical(ApiError),
    /// The request was abandoned by the caller.
    Canceled,
    /// The server answered with a failing status. `body` is the parsed JSON
    /// body, or a JSON string holding the raw text when it was not JSON.
    Response { status: u16, body: Value },
    /// No response reached us (refused connection, DNS, timeout).
    Transport(String),
    /// Anything else.
    Other(String),
}

impl From<reqwest::Error> for Failure {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() || error.is_decode() {
            Failure::Transport(error.to_string())
        } else {
            Failure::Other(error.to_string())
        }
    }
}

impl From<ApiError> for Failure {
    fn from(error: ApiError) -> Self {
        Failure::Canonical(error)
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Convert any typed failure into the canonical shape.
#[must_use]
pub fn normalize(failure: Failure) -> ApiError {
    match failure {
        Failure::Canonical(error) => error,
        Failure::Canceled => ApiError::canceled(),
        Failure::Response { status, body } => from_response(status, &body),
        Failure::Transport(detail) => {
            tracing::debug!(%detail, "error: transport failure");
            ApiError::network()
        }
        Failure::Other(detail) => {
            tracing::error!(%detail, "error: unknown failure normalized");
            ApiError::unknown(detail)
        }
    }
}

/// Convert an untyped JSON value into the canonical shape.
///
/// Objects carrying a connection-failure `code` become `network_error`.
/// Objects that already look canonical (a `code` plus `status` or `message`)
/// are taken as-is. Other objects with a numeric `status` keep that status,
/// their own `code` (default `api_error`) and `message` (default
/// `Error <status>`).
#[must_use]
pub fn normalize_value(value: &Value) -> ApiError {
    if let Some(obj) = value.as_object() {
        if obj.get("code").and_then(Value::as_str).is_some_and(|c| NETWORK_CODES.contains(&c)) {
            return ApiError::network();
        }
        if is_canonical(obj) {
            return from_canonical(obj);
        }
        if let Some(status) = obj.get("status").and_then(as_status) {
            return from_status_object(status, obj);
        }
    }

    let rendered = match value {
        Value::String(s) => s.clone(),
        Value::Null => "An unexpected error occurred.".to_owned(),
        other => other.to_string(),
    };
    tracing::error!(value = %rendered, "error: unknown value normalized");
    ApiError::unknown(rendered)
}

fn is_canonical(obj: &Map<String, Value>) -> bool {
    obj.contains_key("code") && (obj.contains_key("status") || obj.contains_key("message"))
}

fn from_canonical(obj: &Map<String, Value>) -> ApiError {
    let status = obj.get("status").and_then(as_status);
    let code = obj.get("code").and_then(scalar_string).unwrap_or_default();
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| fallback_message(status), str::to_owned);
    let errors = obj.get("errors").and_then(field_errors);
    ApiError { status, code, message, errors }
}

fn from_status_object(status: u16, obj: &Map<String, Value>) -> ApiError {
    let code = obj.get("code").and_then(scalar_string).unwrap_or_else(|| CODE_API.to_owned());
    let message = obj
        .get("message")
        .and_then(message_from)
        .or_else(|| obj.get("detail").and_then(message_from))
        .unwrap_or_else(|| format!("Error {status}"));
    let errors = obj.get("errors").and_then(field_errors);
    ApiError { status: Some(status), code, message, errors }
}

fn fallback_message(status: Option<u16>) -> String {
    status.map_or_else(|| "An unexpected error occurred.".to_owned(), |s| format!("Error {s}"))
}

fn from_response(status: u16, body: &Value) -> ApiError {
    let (message, code) = extract_error_data(body);

    if message.is_none() && code.is_none() {
        return ApiError::new(Some(status), CODE_SERVER, format!("Server error ({status})."));
    }

    ApiError {
        status: Some(status),
        code: code.unwrap_or_else(|| CODE_API.to_owned()),
        message: message.unwrap_or_else(|| format!("Error {status}: Ambiguous server response.")),
        errors: body.get("errors").and_then(field_errors),
    }
}

/// Pull a message and a code out of an error body, in priority order.
fn extract_error_data(body: &Value) -> (Option<String>, Option<String>) {
    let mut message = body
        .get("detail")
        .and_then(message_from)
        .or_else(|| body.get("message").and_then(message_from));
    let mut code = body.get("code").and_then(scalar_string);

    if let Some(errors) = body.get("errors").and_then(Value::as_object) {
        if message.is_none() {
            message = errors
                .get("detail")
                .and_then(message_from)
                .or_else(|| errors.get("message").and_then(message_from));
        }
        if code.is_none() {
            code = errors.get("code").and_then(scalar_string);
        }
        if message.is_none() {
            message = errors.values().find_map(message_from);
        }
    }

    (message, code)
}

/// A usable message: a non-empty string, or the first non-empty string of a list.
fn message_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(str::to_owned),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_status(value: &Value) -> Option<u16> {
    value.as_u64().and_then(|n| u16::try_from(n).ok())
}

fn field_errors(value: &Value) -> Option<FieldErrors> {
    let obj = value.as_object()?;
    let mut out = FieldErrors::new();
    for (field, messages) in obj {
        let list: Vec<String> = match messages {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
            _ => continue,
        };
        out.insert(field.clone(), list);
    }
    Some(out)
}
