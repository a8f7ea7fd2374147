//! Session state: credential pair, decoded identity and login status.
//!
//! SYSTEM CONTEXT
//! ==============
//! One `Session` per process, shared as `Arc<Session>` between the gateway
//! (which asks it to refresh on 401) and whatever renders the UI (which reads
//! snapshots and route guards).
//!
//! DESIGN
//! ======
//! - `is_authenticated` is always `auth_tokens.is_some()`, and `user` is
//!   always set while tokens are held. Every mutation goes through
//!   `set_tokens`/`logout_user` to keep that true.
//! - Hydration is optimistic: persisted tokens are trusted without a network
//!   call. A stale access token is only discovered when the first request
//!   comes back 401 and the refresh protocol runs.
//! - State sits behind a `std::sync::Mutex` that is never held across an
//!   `.await`.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::auth::{AuthEndpoints, LoginCredentials, Registration};
use crate::claims::{ClaimsError, Identity, decode_identity};
use crate::credentials::{CredentialPair, CredentialStore, now_secs};
use crate::error::{ApiError, CODE_INVALID_TOKEN, CODE_TOKEN_REFRESH_FAILED};

pub const LOGIN_INVALID_CREDENTIALS: &str = "E-Mail oder Passwort ist falsch";
pub const LOGIN_FORBIDDEN: &str = "Nur Admin-Nutzer können sich einloggen";
const SESSION_EXPIRED: &str = "Session expired. Please log in again.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("access token could not be decoded: {0}")]
    CorruptToken(#[from] ClaimsError),
}

/// Point-in-time copy of the session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub auth_tokens: Option<CredentialPair>,
    pub is_authenticated: bool,
    pub user: Option<Identity>,
    /// True only while an explicit login call is in flight.
    pub loading: bool,
    pub login_error: Option<ApiError>,
}

pub struct Session {
    store: Arc<dyn CredentialStore>,
    auth: Arc<dyn AuthEndpoints>,
    state: Mutex<SessionSnapshot>,
}

/// Clears `loading` when a login attempt ends, however it ends.
struct LoadingGuard<'a> {
    session: &'a Session,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().loading = false;
    }
}

impl Session {
    /// Build the session from whatever the store holds.
    ///
    /// Both entries must be present and the refresh entry unexpired; the access
    /// entry may already have lapsed, in which case the first request gets a
    /// 401 and refreshes.
    pub fn hydrate(store: Arc<dyn CredentialStore>, auth: Arc<dyn AuthEndpoints>) -> Self {
        let session = Self { store, auth, state: Mutex::new(SessionSnapshot::default()) };

        let entries = session.store.read_entries();
        let refresh_live = entries.refresh.as_ref().is_some_and(|e| !e.is_expired_at(now_secs()));
        let Some(pair) = entries.pair().filter(|_| refresh_live) else {
            return session;
        };

        match decode_identity(&pair.access) {
            Ok(user) => {
                tracing::debug!(email = ?user.email, "session: hydrated from store");
                let mut state = session.lock();
                state.auth_tokens = Some(pair);
                state.user = Some(user);
                state.is_authenticated = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "session: discarding undecodable persisted token");
                session.clear_store();
            }
        }
        session
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "session: failed to clear persisted credentials");
        }
    }

    // =========================================================================
    // READERS
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated
    }

    #[must_use]
    pub fn user(&self) -> Option<Identity> {
        self.lock().user.clone()
    }

    #[must_use]
    pub fn auth_tokens(&self) -> Option<CredentialPair> {
        self.lock().auth_tokens.clone()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.lock().loading
    }

    #[must_use]
    pub fn login_error(&self) -> Option<ApiError> {
        self.lock().login_error.clone()
    }

    /// The backing credential store.
    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Install a new pair, or clear everything with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CorruptToken`] when the access token cannot be
    /// decoded; the session is logged out in that case.
    pub fn set_tokens(&self, pair: Option<CredentialPair>) -> Result<(), SessionError> {
        let Some(pair) = pair else {
            self.logout_user();
            return Ok(());
        };

        let user = match decode_identity(&pair.access) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "session: received undecodable access token, logging out");
                self.logout_user();
                return Err(e.into());
            }
        };

        let mut state = self.lock();
        if let Err(e) = self.store.store_pair(&pair) {
            tracing::warn!(error = %e, "session: failed to persist credentials");
        }
        state.auth_tokens = Some(pair);
        state.user = Some(user);
        state.is_authenticated = true;
        Ok(())
    }

    /// Replace the identity. Returns `false` (and changes nothing) when no
    /// tokens are held.
    pub fn set_user(&self, user: Identity) -> bool {
        let mut state = self.lock();
        if state.auth_tokens.is_none() {
            return false;
        }
        state.user = Some(user);
        true
    }

    /// Clear persisted and in-memory credentials. Idempotent, never fails.
    pub fn logout_user(&self) {
        let mut state = self.lock();
        self.clear_store();
        if state.is_authenticated {
            tracing::info!(email = ?state.user.as_ref().and_then(|u| u.email.as_deref()), "session: logged out");
        }
        state.auth_tokens = None;
        state.user = None;
        state.is_authenticated = false;
        state.login_error = None;
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the error also stored as `login_error`: a fixed message for
    /// 401 and 403, the normalized backend message otherwise.
    pub async fn login_user(&self, credentials: &LoginCredentials) -> Result<(), ApiError> {
        tracing::info!(email = %credentials.email, "session: login attempt");
        self.authenticate(self.auth.login(credentials)).await
    }

    /// Log in with a Google OAuth access token.
    ///
    /// # Errors
    ///
    /// Same contract as [`Session::login_user`].
    pub async fn google_login(&self, access_token: &str) -> Result<(), ApiError> {
        tracing::info!("session: google login attempt");
        self.authenticate(self.auth.google_login(access_token)).await
    }

    /// Create a customer account. The session is not changed.
    ///
    /// # Errors
    ///
    /// Returns the normalized backend error (field errors included).
    pub async fn register_user(&self, registration: &Registration) -> Result<(), ApiError> {
        self.auth.register(registration).await?;
        tracing::info!(email = %registration.email, "session: registered");
        Ok(())
    }

    async fn authenticate<F>(&self, exchange: F) -> Result<(), ApiError>
    where
        F: Future<Output = Result<CredentialPair, ApiError>>,
    {
        {
            let mut state = self.lock();
            state.loading = true;
            state.login_error = None;
        }
        let _loading = LoadingGuard { session: self };

        let result = match exchange.await {
            Ok(pair) => self
                .set_tokens(Some(pair))
                .map_err(|e| ApiError::new(None, CODE_INVALID_TOKEN, e.to_string())),
            Err(error) => Err(login_failure(error)),
        };

        match &result {
            Ok(()) => tracing::info!("session: login succeeded"),
            Err(error) => {
                tracing::info!(status = ?error.status, code = %error.code, "session: login failed");
                self.lock().login_error = Some(error.clone());
            }
        }
        result
    }

    /// Exchange the persisted refresh token for a new pair.
    ///
    /// Any failure logs out: a missing refresh token, a rejected or failed
    /// exchange, or an undecodable replacement pair.
    ///
    /// # Errors
    ///
    /// Returns a 401 `token_refresh_failed` error without a refresh token, and
    /// the normalized exchange error otherwise.
    pub async fn refresh_token(&self) -> Result<CredentialPair, ApiError> {
        let Some(refresh) = self.store.refresh_token() else {
            tracing::info!("session: no refresh token, logging out");
            self.logout_user();
            return Err(ApiError::new(Some(401), CODE_TOKEN_REFRESH_FAILED, SESSION_EXPIRED));
        };

        match self.auth.refresh(&refresh).await {
            Ok(pair) => {
                self.set_tokens(Some(pair.clone()))
                    .map_err(|e| ApiError::new(Some(401), CODE_INVALID_TOKEN, e.to_string()))?;
                tracing::debug!("session: tokens refreshed");
                Ok(pair)
            }
            Err(error) => {
                tracing::warn!(status = ?error.status, code = %error.code, "session: refresh failed, logging out");
                self.logout_user();
                Err(error)
            }
        }
    }
}

fn login_failure(error: ApiError) -> ApiError {
    let message = match error.status {
        Some(401) => LOGIN_INVALID_CREDENTIALS,
        Some(403) => LOGIN_FORBIDDEN,
        _ => return error,
    };
    ApiError { message: message.to_owned(), ..error }
}
