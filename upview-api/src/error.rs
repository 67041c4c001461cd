//! Error Types for the Upview API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Request is authenticated but lacks permission for the resource
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested player does not exist
    PlayerNotFound,

    /// Requested API key does not exist
    ApiKeyNotFound,

    /// Requested workspace does not exist
    WorkspaceNotFound,

    // ========================================================================
    // Upstream Errors (502)
    // ========================================================================
    /// An external API returned a non-success status or malformed payload
    UpstreamError,

    // ========================================================================
    // Rate Limiting (429)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::PlayerNotFound
            | ErrorCode::ApiKeyNotFound
            | ErrorCode::WorkspaceNotFound => StatusCode::NOT_FOUND,

            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::PlayerNotFound => "Player not found",
            ErrorCode::ApiKeyNotFound => "API key not found",
            ErrorCode::WorkspaceNotFound => "Workspace not found",
            ErrorCode::UpstreamError => "Upstream API request failed",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
///
/// This type is returned by all API endpoints when an error occurs.
/// The `error` field carries the human-readable message; rate-limit
/// rejections additionally carry quota metadata in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    #[serde(rename = "error")]
    pub message: String,

    /// Optional additional details (quota metadata, field errors, etc.)
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a ValidationFailed error.
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create a generic not found error with custom message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    /// Create a PlayerNotFound error.
    pub fn player_not_found(player_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::PlayerNotFound,
            format!("Player {} not found", player_id),
        )
    }

    /// Create an ApiKeyNotFound error.
    pub fn api_key_not_found() -> Self {
        Self::new(
            ErrorCode::ApiKeyNotFound,
            "API key not found. Please generate a new key in the dashboard.",
        )
    }

    /// Create a WorkspaceNotFound error.
    pub fn workspace_not_found(workspace_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::WorkspaceNotFound,
            format!("Workspace {} not found", workspace_id),
        )
    }

    /// Create an UpstreamError.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a DatabaseError.
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a ConnectionPoolExhausted error.
    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    /// Create a TooManyRequests error.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling
/// in Axum:
/// ```ignore
/// async fn handler() -> Result<Json<Response>, ApiError> {
///     Err(ApiError::unauthorized("Invalid credentials"))
/// }
/// ```
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID: {}", err))
    }
}

/// Convert from reqwest::Error to ApiError.
///
/// All outbound calls target external APIs, so transport failures
/// surface as upstream errors.
impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Upstream request error: {:?}", err);
        ApiError::upstream(format!("Upstream request failed: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::PlayerNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::UpstreamError.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ErrorCode::TooManyRequests.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_api_error_constructors() {
        let err = ApiError::unauthorized("Invalid API key format");
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.message, "Invalid API key format");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = ApiError::player_not_found("123");
        assert_eq!(err.code, ErrorCode::PlayerNotFound);
        assert!(err.message.contains("123"));

        let err = ApiError::missing_field("name");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("name"));
    }

    #[test]
    fn test_too_many_requests_retry_hint() {
        let err = ApiError::too_many_requests(Some(42));
        assert!(err.message.contains("42"));

        let err = ApiError::too_many_requests(None);
        assert_eq!(err.message, "Rate limit exceeded");
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::unauthorized("Missing API key");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("UNAUTHORIZED"));
        assert!(json.contains("\"error\":\"Missing API key\""));
        Ok(())
    }

    #[test]
    fn test_error_details_flattened() -> Result<(), serde_json::Error> {
        let err = ApiError::too_many_requests(Some(5)).with_details(serde_json::json!({
            "remaining": 0,
            "reset": 1_700_000_000_000u64,
        }));
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("\"remaining\":0"));
        assert!(json.contains("\"reset\":1700000000000"));
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::database_error("Connection failed");
        let display = format!("{}", err);

        assert!(display.contains("DatabaseError"));
        assert!(display.contains("Connection failed"));
    }
}
