//! Roblox Platform Client
//!
//! Thin client over the two public Roblox endpoints the service needs:
//! username-to-id resolution and avatar headshot thumbnails. Implements
//! [`AvatarLookup`] so the resolver never sees HTTP.
//!
//! # Environment Variables
//! - `UPVIEW_ROBLOX_USERS_URL`: Base URL of the users API
//! - `UPVIEW_ROBLOX_THUMBNAILS_URL`: Base URL of the thumbnails API

use crate::avatar::AvatarLookup;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

const DEFAULT_USERS_URL: &str = "https://users.roblox.com";
const DEFAULT_THUMBNAILS_URL: &str = "https://thumbnails.roblox.com";

/// Headshot size requested from the thumbnails API.
const HEADSHOT_SIZE: &str = "48x48";

/// Client for the Roblox users and thumbnails APIs.
#[derive(Clone)]
pub struct RobloxClient {
    client: reqwest::Client,
    users_url: String,
    thumbnails_url: String,
}

impl RobloxClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            users_url: DEFAULT_USERS_URL.to_string(),
            thumbnails_url: DEFAULT_THUMBNAILS_URL.to_string(),
        }
    }

    /// Create a client honoring URL overrides from the environment.
    /// Overrides exist for integration tests against a local stub.
    pub fn from_env(client: reqwest::Client) -> Self {
        Self {
            client,
            users_url: std::env::var("UPVIEW_ROBLOX_USERS_URL")
                .unwrap_or_else(|_| DEFAULT_USERS_URL.to_string()),
            thumbnails_url: std::env::var("UPVIEW_ROBLOX_THUMBNAILS_URL")
                .unwrap_or_else(|_| DEFAULT_THUMBNAILS_URL.to_string()),
        }
    }

    /// Resolve a username to the platform's numeric user id.
    ///
    /// `Ok(None)` means the platform has no (unbanned) user by that name.
    pub async fn user_id_for_username(&self, username: &str) -> ApiResult<Option<u64>> {
        let url = format!("{}/v1/usernames/users", self.users_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "usernames": [username],
                "excludeBannedUsers": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::upstream(format!(
                "Roblox users API returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(body.pointer("/data/0/id").and_then(|v| v.as_u64()))
    }

    /// Fetch the avatar headshot URL for a numeric user id.
    pub async fn headshot_url(&self, roblox_user_id: u64) -> ApiResult<Option<String>> {
        let url = format!(
            "{}/v1/users/avatar-headshot?userIds={}&size={}&format=Png&isCircular=false",
            self.thumbnails_url, roblox_user_id, HEADSHOT_SIZE
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::upstream(format!(
                "Roblox thumbnails API returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(body
            .pointer("/data/0/imageUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

#[async_trait]
impl AvatarLookup for RobloxClient {
    async fn avatar_url_for_username(&self, username: &str) -> ApiResult<Option<String>> {
        let Some(id) = self.user_id_for_username(username).await? else {
            debug!(username, "no Roblox user for username");
            return Ok(None);
        };
        self.headshot_url(id).await
    }
}
