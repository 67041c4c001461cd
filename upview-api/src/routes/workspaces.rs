//! Workspace Routes
//!
//! Session-authenticated workspace management:
//! - GET /workspaces - list the caller's workspaces, oldest first
//! - POST /workspaces - create a workspace
//!
//! A workspace groups ingested feedback; the service API key is linked
//! to the owner's oldest workspace at issue time.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{DbClient, WorkspaceRecord};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;

/// Name length bounds, inclusive.
const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;

/// Description length cap.
const DESCRIPTION_MAX: usize = 500;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateWorkspaceRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkspaceListResponse {
    pub workspaces: Vec<WorkspaceRecord>,
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Validate a create request, returning the trimmed name and the
/// normalized description (empty becomes absent).
fn validate_create(body: &CreateWorkspaceRequest) -> ApiResult<(String, Option<String>)> {
    let name = body.name.trim();
    if name.len() < NAME_MIN || name.len() > NAME_MAX {
        return Err(ApiError::validation_failed(format!(
            "Workspace name must be between {} and {} characters",
            NAME_MIN, NAME_MAX
        )));
    }

    let description = body
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    if let Some(d) = description {
        if d.len() > DESCRIPTION_MAX {
            return Err(ApiError::validation_failed(format!(
                "Workspace description must be at most {} characters",
                DESCRIPTION_MAX
            )));
        }
    }

    Ok((name.to_string(), description.map(|d| d.to_string())))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /workspaces - List the caller's workspaces.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/workspaces",
    tag = "Workspaces",
    responses(
        (status = 200, description = "Workspaces, oldest first", body = WorkspaceListResponse),
        (status = 401, description = "Not authenticated"),
    ),
))]
pub async fn list_workspaces(
    State(db): State<DbClient>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<WorkspaceListResponse>> {
    let workspaces = db.workspace_list(auth.user_id).await?;
    Ok(Json(WorkspaceListResponse { workspaces }))
}

/// POST /workspaces - Create a workspace.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/workspaces",
    tag = "Workspaces",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 201, description = "Created workspace", body = WorkspaceRecord),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Not authenticated"),
    ),
))]
pub async fn create_workspace(
    State(db): State<DbClient>,
    AuthExtractor(auth): AuthExtractor,
    Json(body): Json<CreateWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let (name, description) = validate_create(&body)?;

    let workspace = db
        .workspace_create(auth.user_id, &name, description.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(workspace)))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(list_workspaces).post(create_workspace))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, description: Option<&str>) -> CreateWorkspaceRequest {
        CreateWorkspaceRequest {
            name: name.to_string(),
            description: description.map(|d| d.to_string()),
        }
    }

    #[test]
    fn test_valid_name_passes() {
        let (name, description) = validate_create(&request("My Game", None)).expect("valid");
        assert_eq!(name, "My Game");
        assert!(description.is_none());
    }

    #[test]
    fn test_name_is_trimmed() {
        let (name, _) = validate_create(&request("  Obby Hub  ", None)).expect("valid");
        assert_eq!(name, "Obby Hub");
    }

    #[test]
    fn test_short_name_rejected() {
        assert!(validate_create(&request("x", None)).is_err());
        // One visible char padded with spaces trims down to too short.
        assert!(validate_create(&request("  x  ", None)).is_err());
    }

    #[test]
    fn test_long_name_rejected() {
        assert!(validate_create(&request(&"n".repeat(101), None)).is_err());
        assert!(validate_create(&request(&"n".repeat(100), None)).is_ok());
    }

    #[test]
    fn test_empty_description_normalizes_to_none() {
        let (_, description) = validate_create(&request("My Game", Some(""))).expect("valid");
        assert!(description.is_none());
    }

    #[test]
    fn test_long_description_rejected() {
        assert!(validate_create(&request("My Game", Some(&"d".repeat(501)))).is_err());
        assert!(validate_create(&request("My Game", Some(&"d".repeat(500)))).is_ok());
    }
}
