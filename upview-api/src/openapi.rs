//! OpenAPI Documentation
//!
//! Aggregates the route-level `utoipa::path` annotations into a single
//! document served at `/openapi.json`. Compiled only with the `openapi`
//! feature (on by default).

use utoipa::OpenApi;

use crate::db::{UserProfileRecord, WorkspaceRecord};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Upview API",
        description = "Player feedback collection and triage for Roblox games",
        license(name = "MIT"),
    ),
    paths(
        routes::health::ping,
        routes::health::liveness,
        routes::health::readiness,
        routes::user::get_api_key,
        routes::user::issue_api_key,
        routes::user::get_profile,
        routes::user::update_profile,
        routes::avatars::get_avatar,
        routes::roblox::lookup,
        routes::workspaces::list_workspaces,
        routes::workspaces::create_workspace,
        routes::feedback::submit_feedback,
        routes::billing::create_checkout,
    ),
    components(schemas(
        upview_core::FeedbackCategory,
        upview_core::SubscriptionStatus,
        upview_core::AvatarKind,
        UserProfileRecord,
        WorkspaceRecord,
        routes::health::HealthResponse,
        routes::health::HealthStatus,
        routes::health::HealthDetails,
        routes::health::ComponentHealth,
        routes::user::ApiKeyResponse,
        routes::user::ProfileResponse,
        routes::user::UpdateProfileRequest,
        routes::avatars::AvatarResponse,
        routes::roblox::LookupRequest,
        routes::roblox::LookupResponse,
        routes::workspaces::CreateWorkspaceRequest,
        routes::workspaces::WorkspaceListResponse,
        routes::feedback::SubmitFeedbackRequest,
        routes::feedback::SubmitFeedbackResponse,
        routes::billing::CheckoutResponse,
    )),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "User", description = "Account profile and API key management"),
        (name = "Avatars", description = "Avatar resolution"),
        (name = "Roblox", description = "Public platform lookups"),
        (name = "Workspaces", description = "Workspace management"),
        (name = "Feedback", description = "Game-server feedback ingestion"),
        (name = "Billing", description = "Subscription checkout"),
    ),
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        assert!(!doc.paths.paths.is_empty());
    }

    #[test]
    fn test_feedback_path_is_documented() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&ApiDoc::openapi())?;
        assert!(json.contains("/upview/feedback"));
        assert!(json.contains("/api/user/api-key"));
        Ok(())
    }

    #[test]
    fn test_record_schemas_render_ids_as_uuid_strings() -> Result<(), serde_json::Error> {
        let doc = serde_json::to_value(ApiDoc::openapi())?;

        let profile = doc
            .pointer("/components/schemas/UserProfileRecord/properties/user_id")
            .cloned()
            .unwrap_or_default();
        assert_eq!(profile["type"], "string");
        assert_eq!(profile["format"], "uuid");

        let workspace = doc
            .pointer("/components/schemas/WorkspaceRecord/properties/created_at")
            .cloned()
            .unwrap_or_default();
        assert_eq!(workspace["type"], "string");
        assert_eq!(workspace["format"], "date-time");
        Ok(())
    }
}
