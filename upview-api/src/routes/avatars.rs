//! Avatar Routes
//!
//! Session-authenticated avatar resolution for the dashboard:
//! - GET /api/avatars?type={user|player}&id={uuid}
//!
//! Player avatars go through the 24-hour cache; user avatars are always
//! fetched live. See [`crate::avatar`] for the resolution rules.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::{ApiAvatarResolver, AppState};
use upview_core::AvatarKind;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AvatarQuery {
    /// Subject kind: "user" or "player"
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Subject id
    pub id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AvatarResponse {
    /// Resolved image URL.
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/avatars - Resolve an avatar image URL.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/avatars",
    tag = "Avatars",
    params(
        ("type" = String, Query, description = "Subject kind: user or player"),
        ("id" = Uuid, Query, description = "Subject id"),
    ),
    responses(
        (status = 200, description = "Resolved avatar", body = AvatarResponse),
        (status = 400, description = "Missing or invalid query parameters"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Subject has no resolvable avatar"),
        (status = 502, description = "Platform API failure"),
    ),
))]
pub async fn get_avatar(
    State(avatars): State<Arc<ApiAvatarResolver>>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<AvatarQuery>,
) -> ApiResult<Json<AvatarResponse>> {
    let kind: AvatarKind = query
        .kind
        .as_deref()
        .ok_or_else(|| ApiError::missing_field("type"))?
        .parse()
        .map_err(|_| ApiError::invalid_format("type", "'user' or 'player'"))?;

    let id = query.id.ok_or_else(|| ApiError::missing_field("id"))?;

    let resolved = avatars.resolve(kind, id, auth.user_id).await?;

    Ok(Json(AvatarResponse {
        image_url: resolved.image_url().to_string(),
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(get_avatar))
}
