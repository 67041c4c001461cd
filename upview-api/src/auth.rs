//! Authentication Module
//!
//! Two credential surfaces:
//!
//! - Dashboard sessions: a bearer token verified against the hosted
//!   identity provider. Used by the browser-facing routes.
//! - Service API keys: `upv_`-prefixed keys presented by game servers
//!   via the `x-api-key` header. Format-checked here; ownership is
//!   resolved through the database.
//!
//! # Environment Variables
//! - `UPVIEW_SESSION_ENDPOINT`: Identity provider session verification URL

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use upview_core::EntityId;
use uuid::Uuid;

// ============================================================================
// API KEY FORMAT
// ============================================================================

/// Service key shape: `upv_` followed by four groups of four lowercase
/// hex characters, underscore-separated.
static API_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^upv_[a-f0-9]{4}_[a-f0-9]{4}_[a-f0-9]{4}_[a-f0-9]{4}$")
        .unwrap_or_else(|e| panic!("invalid API key pattern: {e}"))
});

/// Whether a presented key matches the service key format.
///
/// A cheap prefilter that rejects garbage before any database work.
pub fn is_valid_key_format(key: &str) -> bool {
    API_KEY_PATTERN.is_match(key)
}

/// Generate a new service API key.
pub fn generate_api_key() -> String {
    let mut rng = rand::rng();
    let group = |rng: &mut rand::rngs::ThreadRng| -> String {
        let bytes: [u8; 2] = rng.random();
        hex::encode(bytes)
    };
    format!(
        "upv_{}_{}_{}_{}",
        group(&mut rng),
        group(&mut rng),
        group(&mut rng),
        group(&mut rng)
    )
}

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// The authenticated principal attached to a request after session
/// verification. Injected into request extensions by the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// The authenticated user's id
    pub user_id: EntityId,
    /// Email, when the provider reports one
    pub email: Option<String>,
}

impl AuthContext {
    pub fn new(user_id: EntityId) -> Self {
        Self {
            user_id,
            email: None,
        }
    }

    pub fn with_email(user_id: EntityId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: Some(email.into()),
        }
    }
}

// ============================================================================
// SESSION VERIFICATION
// ============================================================================

/// Bearer-token verification seam. The production implementation calls
/// the hosted identity provider; tests substitute a static verifier.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// Verify a bearer token and return the principal it belongs to.
    async fn verify(&self, token: &str) -> ApiResult<AuthContext>;
}

/// Session verifier backed by the identity provider's HTTP API.
#[derive(Clone)]
pub struct RemoteSessionVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteSessionVerifier {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Create a verifier from `UPVIEW_SESSION_ENDPOINT`.
    pub fn from_env(client: reqwest::Client) -> ApiResult<Self> {
        let endpoint = std::env::var("UPVIEW_SESSION_ENDPOINT")
            .map_err(|_| ApiError::internal_error("UPVIEW_SESSION_ENDPOINT not set"))?;
        Ok(Self::new(client, endpoint))
    }
}

#[async_trait]
impl SessionVerifier for RemoteSessionVerifier {
    async fn verify(&self, token: &str) -> ApiResult<AuthContext> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::unauthorized("Session token rejected"));
        }

        let body: serde_json::Value = response.json().await?;

        let user_id = body
            .pointer("/user/id")
            .or_else(|| body.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::unauthorized("Session response missing user id"))?;

        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ApiError::unauthorized("Session user id is not a valid UUID"))?;

        let email = body
            .pointer("/user/email")
            .or_else(|| body.get("email"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(AuthContext { user_id, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_match_the_format() {
        for _ in 0..100 {
            let key = generate_api_key();
            assert!(is_valid_key_format(&key), "generated key {key} is invalid");
        }
    }

    #[test]
    fn test_key_format_accepts_canonical_key() {
        assert!(is_valid_key_format("upv_1a2b_3c4d_5e6f_7a8b"));
        assert!(is_valid_key_format("upv_0000_ffff_dead_beef"));
    }

    #[test]
    fn test_key_format_rejects_bad_shapes() {
        assert!(!is_valid_key_format(""));
        assert!(!is_valid_key_format("upv_1a2b_3c4d_5e6f"));
        assert!(!is_valid_key_format("upv_1a2b_3c4d_5e6f_7a8b_9c0d"));
        assert!(!is_valid_key_format("api_1a2b_3c4d_5e6f_7a8b"));
        // Uppercase hex is not canonical.
        assert!(!is_valid_key_format("upv_1A2B_3C4D_5E6F_7A8B"));
        // Non-hex characters.
        assert!(!is_valid_key_format("upv_1g2b_3c4d_5e6f_7a8b"));
        // Trailing garbage.
        assert!(!is_valid_key_format("upv_1a2b_3c4d_5e6f_7a8b "));
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
    }
}
