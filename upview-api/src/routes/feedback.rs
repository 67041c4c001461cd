//! Feedback Ingestion Route
//!
//! The service-facing entry point game servers call:
//! - POST /upview/feedback, authenticated by `x-api-key`
//!
//! Request flow:
//! 1. Extract and format-check the API key (no database work for garbage)
//! 2. Rate limit per key (429 with X-RateLimit-* headers when over)
//! 3. Resolve the key to its owner and workspace
//! 4. Touch the key's last-used stamp (failures logged, not fatal)
//! 5. Validate the body
//! 6. Classify the text (degrades to `other` on classifier trouble)
//! 7. Persist and answer with the remaining window budget

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::auth::is_valid_key_format;
use crate::classify::FeedbackClassifier;
use crate::db::{DbClient, NewFeedback};
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::RateLimitExceeded;
use crate::state::{ApiRateLimiter, AppState};
use upview_core::FeedbackCategory;

/// Feedback text length cap.
const TEXT_MAX: usize = 2000;

// ============================================================================
// TYPES
// ============================================================================

/// Ingestion request body. Field names match the game SDK's wire format.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubmitFeedbackRequest {
    /// The feedback text.
    #[serde(alias = "feedback")]
    pub text: String,
    #[serde(default, alias = "gameId")]
    pub game_id: Option<String>,
    #[serde(default, alias = "playerId")]
    pub player_id: Option<String>,
    #[serde(default, alias = "playerName")]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubmitFeedbackResponse {
    pub success: bool,
    /// Category the classifier assigned.
    pub category: FeedbackCategory,
    /// Requests left in the current rate-limit window.
    pub remaining: i64,
    /// When the window resets, epoch milliseconds.
    pub reset: i64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /upview/feedback - Ingest one piece of player feedback.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/upview/feedback",
    tag = "Feedback",
    request_body = SubmitFeedbackRequest,
    responses(
        (status = 200, description = "Feedback stored", body = SubmitFeedbackResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Missing, malformed, unknown, or workspace-less API key"),
        (status = 429, description = "Rate limit exceeded"),
    ),
))]
pub async fn submit_feedback(
    State(db): State<DbClient>,
    State(limiter): State<Arc<ApiRateLimiter>>,
    State(classifier): State<Arc<dyn FeedbackClassifier>>,
    headers: HeaderMap,
    Json(body): Json<SubmitFeedbackRequest>,
) -> Result<Response, Response> {
    // Steps 1-2: key extraction and format check, before any database work.
    let key = headers
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing API key").into_response())?;

    if !is_valid_key_format(key) {
        return Err(ApiError::unauthorized("Invalid API key format").into_response());
    }

    // Step 3: rate limit. Degraded outcomes pass through.
    let now = Utc::now();
    let decision = limiter.check_at(key, now).await;
    if !decision.is_allowed() {
        return Err(RateLimitExceeded { decision, now }.into_response());
    }

    // Step 4: resolve ownership. A known key without a workspace gets
    // its own message so the dashboard can point the user at the fix.
    let record = db
        .api_key_lookup(key)
        .await
        .map_err(IntoResponse::into_response)?
        .ok_or_else(|| ApiError::api_key_not_found().into_response())?;

    let workspace_id = record.workspace_id.ok_or_else(|| {
        ApiError::unauthorized(
            "API key is not associated with a workspace. \
             Please create a workspace in the dashboard.",
        )
        .into_response()
    })?;

    // Step 5: usage stamp, advisory only.
    if let Err(e) = db.api_key_touch(key).await {
        warn!(error = %e, "failed to update API key last-used stamp");
    }

    // Step 6: validate.
    let text = validate_text(&body.text).map_err(IntoResponse::into_response)?;

    // Step 7: classify and persist.
    let category = classifier.classify(&text).await;

    db.feedback_insert(&NewFeedback {
        user_id: record.user_id,
        workspace_id,
        game_id: body.game_id.clone(),
        player_id: body.player_id.clone(),
        player_name: body.player_name.clone(),
        text,
        category,
    })
    .await
    .map_err(IntoResponse::into_response)?;

    // Quota headers ride along on success too, matching the 429 shape.
    let mut response = Json(SubmitFeedbackResponse {
        success: true,
        category,
        remaining: decision.remaining,
        reset: decision.reset_at_ms,
    })
    .into_response();
    decision.apply_headers(response.headers_mut());

    Ok(response)
}

fn validate_text(raw: &str) -> ApiResult<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ApiError::missing_field("feedback"));
    }
    if text.len() > TEXT_MAX {
        return Err(ApiError::validation_failed(format!(
            "Feedback text must be at most {} characters",
            TEXT_MAX
        )));
    }
    Ok(text.to_string())
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/feedback", post(submit_feedback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_sdk_field_names() -> Result<(), serde_json::Error> {
        let body: SubmitFeedbackRequest = serde_json::from_str(
            "{\"feedback\":\"the door is stuck\",\"playerId\":\"12345\",\"playerName\":\"builderman\"}",
        )?;
        assert_eq!(body.text, "the door is stuck");
        assert_eq!(body.player_id.as_deref(), Some("12345"));
        assert_eq!(body.player_name.as_deref(), Some("builderman"));
        assert!(body.game_id.is_none());
        Ok(())
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(validate_text("").is_err());
        assert!(validate_text("   ").is_err());
    }

    #[test]
    fn test_text_is_trimmed_and_capped() {
        assert_eq!(validate_text("  laggy  ").expect("valid"), "laggy");
        assert!(validate_text(&"x".repeat(2001)).is_err());
        assert!(validate_text(&"x".repeat(2000)).is_ok());
    }

    #[test]
    fn test_response_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&SubmitFeedbackResponse {
            success: true,
            category: FeedbackCategory::Bug,
            remaining: 59,
            reset: 1_700_000_000_000,
        })?;
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"category\":\"bug\""));
        assert!(json.contains("\"remaining\":59"));
        Ok(())
    }
}
