//! User Account Routes
//!
//! Session-authenticated routes for the dashboard user's own account:
//! - GET/POST /api/user/api-key - fetch or (re)issue the service API key
//! - GET/PUT /api/user/profile - fetch or upsert the linked platform identity
//!
//! Issuing a key supersedes the previous one; there is at most one live
//! key per user.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::generate_api_key;
use crate::db::{DbClient, UserProfileRecord};
use crate::error::ApiResult;
use crate::middleware::AuthExtractor;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Response for API key fetch and issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiKeyResponse {
    /// The service key, or null when none has been issued yet.
    pub api_key: Option<String>,
}

/// Response for profile fetch: the profile, or null when none exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProfileResponse {
    pub profile: Option<UserProfileRecord>,
}

/// Request body for profile upsert.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateProfileRequest {
    pub roblox_id: Option<String>,
    pub roblox_username: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/user/api-key - The caller's current service key, if any.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/user/api-key",
    tag = "User",
    responses(
        (status = 200, description = "Current API key (null if none issued)", body = ApiKeyResponse),
        (status = 401, description = "Not authenticated"),
    ),
))]
pub async fn get_api_key(
    State(db): State<DbClient>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<ApiKeyResponse>> {
    let api_key = db.api_key_for_user(auth.user_id).await?;
    Ok(Json(ApiKeyResponse { api_key }))
}

/// POST /api/user/api-key - Issue a fresh service key.
///
/// Any previously issued key stops working immediately.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/user/api-key",
    tag = "User",
    responses(
        (status = 200, description = "Newly issued API key", body = ApiKeyResponse),
        (status = 401, description = "Not authenticated"),
    ),
))]
pub async fn issue_api_key(
    State(db): State<DbClient>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<ApiKeyResponse>> {
    let key = generate_api_key();
    let record = db.api_key_issue(auth.user_id, &key).await?;

    info!(user_id = %auth.user_id, "issued new service API key");

    Ok(Json(ApiKeyResponse {
        api_key: Some(record.key),
    }))
}

/// GET /api/user/profile - The caller's profile, or null.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/user/profile",
    tag = "User",
    responses(
        (status = 200, description = "Profile (null if none exists)", body = ProfileResponse),
        (status = 401, description = "Not authenticated"),
    ),
))]
pub async fn get_profile(
    State(db): State<DbClient>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = db.profile_get(auth.user_id).await?;
    Ok(Json(ProfileResponse { profile }))
}

/// PUT /api/user/profile - Upsert the caller's linked platform identity.
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/api/user/profile",
    tag = "User",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfileRecord),
        (status = 401, description = "Not authenticated"),
    ),
))]
pub async fn update_profile(
    State(db): State<DbClient>,
    AuthExtractor(auth): AuthExtractor,
    Json(body): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = db
        .profile_upsert(
            auth.user_id,
            body.roblox_id.as_deref(),
            body.roblox_username.as_deref(),
        )
        .await?;

    Ok((StatusCode::OK, Json(profile)))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api-key", get(get_api_key).post(issue_api_key))
        .route("/profile", get(get_profile).put(update_profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_response_null_when_absent() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&ApiKeyResponse { api_key: None })?;
        assert_eq!(json, "{\"api_key\":null}");
        Ok(())
    }

    #[test]
    fn test_update_profile_request_accepts_partial_body() -> Result<(), serde_json::Error> {
        let body: UpdateProfileRequest =
            serde_json::from_str("{\"roblox_username\":\"builderman\"}")?;
        assert_eq!(body.roblox_username.as_deref(), Some("builderman"));
        assert!(body.roblox_id.is_none());
        Ok(())
    }
}
