//! Customer account calls issued through the gateway.
//!
//! Both calls are skipped when no one is logged in; a session that expires
//! mid-call is refreshed by the gateway like any other request.

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::gateway::HttpGateway;
use crate::http::ApiRequest;

pub const USER_DATA_PATH: &str = "/user/user-data/";
pub const UPDATE_PROFILE_PATH: &str = "/user/update/";

/// Profile details that are not part of the token claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    pub date_joined: Option<String>,
    pub phone_number: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
    pub image_url: Option<String>,
}

/// Fields to change on the profile form. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
}

impl ProfileUpdate {
    fn form_pairs(&self) -> Vec<(&'static str, String)> {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("phone_number", &self.phone_number),
            ("city", &self.city),
            ("street", &self.street),
            ("zip", &self.zip),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
        .collect()
    }
}

/// Load the logged-in user's profile details. `Ok(None)` when logged out.
///
/// # Errors
///
/// Returns the normalized [`ApiError`] from the gateway.
pub async fn fetch_user_data(gateway: &HttpGateway) -> Result<Option<UserData>, ApiError> {
    if !gateway.session().is_authenticated() {
        tracing::debug!("account: skipping user data fetch, not logged in");
        return Ok(None);
    }
    gateway.get_json(USER_DATA_PATH).await.map(Some)
}

/// Submit the profile form. Returns `false` when logged out and nothing was sent.
///
/// # Errors
///
/// Returns the normalized [`ApiError`] (field errors included) from the gateway.
pub async fn update_user_profile(gateway: &HttpGateway, update: &ProfileUpdate) -> Result<bool, ApiError> {
    if !gateway.session().is_authenticated() {
        tracing::debug!("account: skipping profile update, not logged in");
        return Ok(false);
    }
    gateway.send(ApiRequest::put(UPDATE_PROFILE_PATH).form(update.form_pairs())).await?;
    tracing::info!("account: profile updated");
    Ok(true)
}
