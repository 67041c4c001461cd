//! Roblox Lookup Route
//!
//! Public username-to-avatar lookup used by the marketing site's
//! profile preview:
//! - POST /roblox {"username": "..."}
//!
//! No caching and no auth; this is a straight proxy over the platform
//! APIs with our error taxonomy.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::roblox::RobloxClient;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LookupRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LookupResponse {
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /roblox - Resolve a platform username to a headshot URL.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/roblox",
    tag = "Roblox",
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Headshot URL for the username", body = LookupResponse),
        (status = 400, description = "Empty username"),
        (status = 404, description = "No such user"),
        (status = 502, description = "Platform API failure"),
    ),
))]
pub async fn lookup(
    State(roblox): State<RobloxClient>,
    Json(body): Json<LookupRequest>,
) -> ApiResult<Json<LookupResponse>> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::missing_field("username"));
    }

    let Some(id) = roblox.user_id_for_username(username).await? else {
        return Err(ApiError::player_not_found(username));
    };

    let image_url = roblox.headshot_url(id).await?;

    Ok(Json(LookupResponse { image_url }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(lookup))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_request_deserializes() -> Result<(), serde_json::Error> {
        let body: LookupRequest = serde_json::from_str("{\"username\":\"builderman\"}")?;
        assert_eq!(body.username, "builderman");
        Ok(())
    }
}
