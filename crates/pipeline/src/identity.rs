//! Identity lookups
//!
//! Two calls that resolve who an account is: the settings endpoint answers
//! with the account's own handle, and the GraphQL user lookup maps a handle to
//! its numeric id. Both go through `Pipeline::execute`, so they double as an
//! account health check.

use account::Account;
use serde_json::{Value, json};
use tracing::debug;
use transport::Transport;

use crate::constants::{SETTINGS_URL, USER_BY_SCREEN_NAME_URL};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::request::{ApiRequest, ApiResponse};

/// Public profile fields returned by the user lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub id: u64,
    pub username: String,
    pub name: String,
}

impl UserData {
    /// Parse a `data.user.result` object.
    fn from_result(result: &Value) -> Option<Self> {
        let id = match result.get("rest_id")? {
            Value::String(s) => s.parse::<u64>().ok()?,
            Value::Number(n) => n.as_u64()?,
            _ => return None,
        };
        let legacy = result.get("legacy")?;
        Some(Self {
            id,
            username: legacy.get("screen_name")?.as_str()?.to_string(),
            name: legacy
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

fn user_lookup_request(username: &str) -> ApiRequest {
    let variables = json!({
        "screen_name": username.trim_start_matches('@'),
        "withSafetyModeUserFields": true,
    });
    let features = json!({
        "hidden_profile_likes_enabled": true,
        "hidden_profile_subscriptions_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "subscriptions_verification_info_is_identity_verified_enabled": true,
        "subscriptions_verification_info_verified_since_enabled": true,
        "highlights_tweets_tab_ui_enabled": true,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "responsive_web_graphql_timeline_navigation_enabled": true,
    });
    let field_toggles = json!({ "withAuxiliaryUserLabels": false });

    ApiRequest::get(USER_BY_SCREEN_NAME_URL)
        .query("variables", variables.to_string())
        .query("features", features.to_string())
        .query("fieldToggles", field_toggles.to_string())
}

fn missing(response: &ApiResponse, what: &str) -> Error {
    Error::UnexpectedResponse(format!("{what} missing from {} response", response.status))
}

impl<T: Transport> Pipeline<T> {
    /// Fetch the account's own handle and store it on the account.
    pub async fn request_username(&self, account: &mut Account) -> Result<String> {
        let response = self
            .execute(account, ApiRequest::post(SETTINGS_URL))
            .await?;
        let username = response
            .pointer("/screen_name")
            .and_then(Value::as_str)
            .ok_or_else(|| missing(&response, "screen_name"))?
            .to_string();

        debug!(account = %account, username = %username, "resolved username");
        account.set_username(username.clone());
        Ok(username)
    }

    /// Look up a user by handle.
    ///
    /// When the handle is the account's own, the account's `user_id` is
    /// filled in as a side effect.
    pub async fn request_user_data(&self, account: &mut Account, username: &str) -> Result<UserData> {
        let response = self.execute(account, user_lookup_request(username)).await?;
        let user = response
            .pointer("/data/user/result")
            .and_then(UserData::from_result)
            .ok_or_else(|| missing(&response, "data.user.result"))?;

        let is_self = account
            .username()
            .is_some_and(|own| own.eq_ignore_ascii_case(&user.username));
        if is_self {
            account.set_user_id(user.id);
        }
        Ok(user)
    }

    /// Resolve the account's numeric id, fetching the username first if needed.
    pub async fn request_user_id(&self, account: &mut Account) -> Result<u64> {
        if let Some(id) = account.user_id() {
            return Ok(id);
        }
        let username = match account.username() {
            Some(username) => username.to_string(),
            None => self.request_username(account).await?,
        };
        let user = self.request_user_data(account, &username).await?;
        account.set_user_id(user.id);
        Ok(user.id)
    }
}
