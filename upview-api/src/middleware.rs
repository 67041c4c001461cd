//! Axum Middleware for Session Authentication
//!
//! This module provides Axum middleware that:
//! - Verifies `Authorization: Bearer` session tokens against the
//!   identity provider
//! - Injects [`AuthContext`] into request extensions
//! - Returns 401 for unauthenticated requests
//!
//! Service API-key authentication is NOT middleware: the key-scoped
//! ingestion route resolves keys itself because the failure modes
//! (format vs unknown key vs missing workspace) carry distinct
//! responses.

use crate::auth::{AuthContext, SessionVerifier};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the session middleware.
#[derive(Clone)]
pub struct SessionMiddlewareState {
    /// Session verifier
    pub verifier: Arc<dyn SessionVerifier>,
}

impl SessionMiddlewareState {
    pub fn new(verifier: Arc<dyn SessionVerifier>) -> Self {
        Self { verifier }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Axum middleware for dashboard session authentication.
///
/// 1. Extracts the `Authorization: Bearer` header
/// 2. Verifies the token with the configured [`SessionVerifier`]
/// 3. Injects [`AuthContext`] into request extensions on success
pub async fn session_middleware(
    State(state): State<SessionMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AuthMiddlewareError(ApiError::unauthorized(
                "Authentication required: provide an Authorization: Bearer header",
            ))
        })?;

    let auth_context = state
        .verifier
        .verify(token)
        .await
        .map_err(AuthMiddlewareError)?;

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        let api_error = self.0;
        (api_error.code.status_code(), Json(api_error)).into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed Axum extractor for the authenticated principal.
///
/// Requires `session_middleware` on the route; without it the extractor
/// returns a 500 so the misconfiguration is loud.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "AuthContext not found in request extensions. \
                     Ensure session_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
