//! Identity claims decoded from JWT-shaped access tokens.
//!
//! The payload is read without signature verification: the backend is the
//! authority, the client only needs the claims to render who is logged in.

#[cfg(test)]
#[path = "claims_test.rs"]
mod tests;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Identity claim set carried in the access token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "profile_img_url")]
    pub profile_image_url: Option<String>,
}

impl Identity {
    /// `"First Last"`, falling back to the email when no name is present.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            return self.email.clone();
        }
        Some(parts.join(" "))
    }
}

/// Decoded access-token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub identity: Identity,
    /// Expiry as unix seconds, when the issuer set one.
    #[serde(default)]
    pub exp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token is not JWT-shaped (expected 3 segments, found {0})")]
    Shape(usize),
    #[error("token payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not a JSON claim set: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode the payload segment of `token`.
///
/// # Errors
///
/// Returns [`ClaimsError`] when the token does not have three segments or the
/// payload is not base64url-encoded JSON.
pub fn decode_access_claims(token: &str) -> Result<AccessClaims, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::Shape(segments.len()));
    }
    let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Decode only the identity part of `token`.
///
/// # Errors
///
/// See [`decode_access_claims`].
pub fn decode_identity(token: &str) -> Result<Identity, ClaimsError> {
    decode_access_claims(token).map(|claims| claims.identity)
}
