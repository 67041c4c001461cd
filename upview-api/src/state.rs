//! Shared application state for Axum routers.

use std::sync::Arc;

use crate::avatar::AvatarResolver;
use crate::classify::FeedbackClassifier;
use crate::config::ApiConfig;
use crate::db::DbClient;
use crate::rate_limit::RateLimiter;
use crate::roblox::RobloxClient;
use crate::routes::billing::BillingState;

/// The rate limiter wired to the production store.
pub type ApiRateLimiter = RateLimiter<DbClient>;

/// The avatar resolver wired to the production store and platform client.
pub type ApiAvatarResolver = AvatarResolver<DbClient, RobloxClient>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Database client.
    pub db: DbClient,
    /// Per-API-key rate limiter for the ingestion route.
    pub limiter: Arc<ApiRateLimiter>,
    /// Avatar resolver (player cache + platform lookups).
    pub avatars: Arc<ApiAvatarResolver>,
    /// Feedback classifier.
    pub classifier: Arc<dyn FeedbackClassifier>,
    /// Roblox platform client, for the direct lookup route.
    pub roblox: RobloxClient,
    /// Payment provider state for checkout and webhooks.
    pub billing: Arc<BillingState>,
    /// API-level configuration.
    pub config: Arc<ApiConfig>,
    pub start_time: std::time::Instant,
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(DbClient, db);
crate::impl_from_ref!(Arc<ApiRateLimiter>, limiter);
crate::impl_from_ref!(Arc<ApiAvatarResolver>, avatars);
crate::impl_from_ref!(Arc<dyn FeedbackClassifier>, classifier);
crate::impl_from_ref!(RobloxClient, roblox);
crate::impl_from_ref!(Arc<BillingState>, billing);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(std::time::Instant, start_time);
