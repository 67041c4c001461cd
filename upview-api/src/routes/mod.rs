//! REST API Routes Module
//!
//! This module contains all route handlers organized by surface:
//! - Dashboard routes (session auth): profile, API key, avatars,
//!   workspaces, checkout
//! - Service routes (API key auth, handled in-handler): feedback ingestion
//! - Public routes: health checks, platform lookup, payment webhooks
//! - CORS support for the browser dashboard

pub mod avatars;
pub mod billing;
pub mod feedback;
pub mod health;
pub mod roblox;
pub mod user;
pub mod workspaces;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::post,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::SessionVerifier;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{session_middleware, SessionMiddlewareState};
use crate::state::AppState;

#[cfg(feature = "openapi")]
use crate::openapi::ApiDoc;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(ApiDoc::openapi())
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

/// Check if running in a production environment.
fn is_production_environment() -> bool {
    std::env::var("UPVIEW_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

/// Validate API configuration for production use.
fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set UPVIEW_CORS_ORIGINS.",
        ));
    }
    Ok(())
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Create the complete API router.
///
/// # Route Surfaces
/// - `/api/user/*`, `/api/avatars`, `/workspaces`, `/api/stripe/create-checkout`:
///   dashboard routes behind session authentication
/// - `/upview/feedback`: service ingestion, authenticated by `x-api-key`
///   inside the handler
/// - `/roblox`: public platform lookup
/// - `/api/stripe/webhook`: payment provider callbacks, authenticated by
///   signature
/// - `/health/*`: public health checks
///
/// In production (`UPVIEW_ENVIRONMENT=production`), validates that CORS
/// origins are configured at startup.
pub fn create_api_router(
    state: AppState,
    verifier: Arc<dyn SessionVerifier>,
) -> ApiResult<Router> {
    if is_production_environment() {
        validate_api_config_for_production(&state.config)?;
    }

    let session_state = SessionMiddlewareState::new(verifier);

    // Dashboard routes: session auth required.
    let protected = Router::new()
        .nest("/api/user", user::create_router())
        .nest("/api/avatars", avatars::create_router())
        .nest("/workspaces", workspaces::create_router())
        .route(
            "/api/stripe/create-checkout",
            post(billing::create_checkout),
        )
        .route_layer(from_fn_with_state(session_state, session_middleware));

    let router = Router::new()
        .merge(protected)
        // Service ingestion: API key auth happens in the handler.
        .nest("/upview", feedback::create_router())
        // Public platform lookup.
        .nest("/roblox", roblox::create_router())
        // Webhooks: signature auth happens in the handler.
        .route("/api/stripe/webhook", post(billing::webhook))
        // Health checks (no auth required).
        .nest("/health", health::create_router());

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", axum::routing::get(openapi_json));

    let cors = build_cors_layer(&state.config);

    Ok(router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-api-key"),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_validation_requires_origins() {
        let config = ApiConfig::default();
        assert!(validate_api_config_for_production(&config).is_err());

        let configured = ApiConfig {
            cors_origins: vec!["https://upview.gg".to_string()],
            ..ApiConfig::default()
        };
        assert!(validate_api_config_for_production(&configured).is_ok());
    }
}
