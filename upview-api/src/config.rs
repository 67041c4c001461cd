//! API Configuration Module
//!
//! This module provides configuration for CORS, the listen address, and
//! other production-level API settings. Configuration is loaded from
//! environment variables with sensible defaults for development.
//!
//! Rate-limit and database settings have their own config types next to
//! the code that consumes them ([`crate::rate_limit::RateLimitConfig`],
//! [`crate::db::DbConfig`]).

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the HTTP surface.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the server binds to.
    pub bind_addr: String,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            // CORS defaults: permissive for development
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `UPVIEW_BIND_ADDR`: Listen address (default: 0.0.0.0:8080)
    /// - `UPVIEW_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `UPVIEW_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("UPVIEW_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let cors_origins = std::env::var("UPVIEW_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("UPVIEW_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(86400);

        Self {
            bind_addr,
            cors_origins,
            cors_max_age_secs,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(!config.is_production());
    }

    #[test]
    fn test_is_production() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());

        config.cors_origins = vec!["https://upview.gg".to_string()];
        assert!(config.is_production());
    }
}
