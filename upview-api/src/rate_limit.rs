//! Rate Limiting Module
//!
//! Fixed-window, per-API-key rate limiting backed by a persistent event
//! store. Each admitted or rejected request records one event row; the
//! window count is the number of events with `created_at` inside the
//! current window.
//!
//! The limiter fails open: if the store cannot be read, the request is
//! admitted with a `Degraded` outcome rather than blocking traffic on
//! infrastructure trouble.

use crate::error::ApiResult;
use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::warn;
use upview_core::EntityId;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window per API key
    pub max_requests: i64,
    /// Window length in seconds
    pub window_secs: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    /// Create rate limit configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_requests: std::env::var("UPVIEW_RATE_LIMIT_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            window_secs: std::env::var("UPVIEW_RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

// ============================================================================
// STORE SEAM
// ============================================================================

/// Persistence operations the limiter needs. `DbClient` implements this
/// against PostgreSQL; tests use an in-memory double.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Resolve the key to its owning user, for attribution on event rows.
    async fn owner_of_key(&self, key: &str) -> ApiResult<Option<EntityId>>;

    /// Count events for this key at or after `since`.
    async fn count_events_since(&self, key: &str, since: DateTime<Utc>) -> ApiResult<i64>;

    /// Record one request event.
    async fn record_event(
        &self,
        key: &str,
        user_id: Option<EntityId>,
        at: DateTime<Utc>,
    ) -> ApiResult<()>;

    /// Delete events for this key older than `before`. Returns rows removed.
    async fn prune_events_before(&self, key: &str, before: DateTime<Utc>) -> ApiResult<u64>;
}

// ============================================================================
// DECISION TYPES
// ============================================================================

/// How the limiter ruled on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Under the limit; proceed.
    Admitted,
    /// Over the limit; reject with 429.
    Rejected,
    /// Store failure; admitted without an accurate count (fail-open).
    Degraded,
}

/// The limiter's ruling plus the header values that go with it.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub outcome: RateLimitOutcome,
    /// Window capacity, for the X-RateLimit-Limit header.
    pub limit: i64,
    /// Requests left in the window, clamped to zero.
    pub remaining: i64,
    /// When the window resets, as epoch milliseconds.
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Whether the request should proceed. Degraded counts as allowed.
    pub fn is_allowed(&self) -> bool {
        self.outcome != RateLimitOutcome::Rejected
    }

    /// Seconds until the window resets, rounded up, for Retry-After.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = self.reset_at_ms - now.timestamp_millis();
        if ms <= 0 {
            0
        } else {
            (ms as u64).div_ceil(1000)
        }
    }

    /// Write the X-RateLimit-* headers for this decision. Admitted and
    /// rejected responses both carry the quota metadata.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        if let Ok(value) = self.limit.to_string().parse() {
            headers.insert("X-RateLimit-Limit", value);
        }
        if let Ok(value) = self.remaining.to_string().parse() {
            headers.insert("X-RateLimit-Remaining", value);
        }
        if let Ok(value) = self.reset_at_ms.to_string().parse() {
            headers.insert("X-RateLimit-Reset", value);
        }
    }
}

/// A rejected decision rendered as an HTTP response.
///
/// Carries the standard X-RateLimit-* headers and a Retry-After hint.
pub struct RateLimitExceeded {
    pub decision: RateLimitDecision,
    pub now: DateTime<Utc>,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.decision.retry_after_secs(self.now);

        // Body mirrors the headers so SDK clients get the quota without
        // header plumbing.
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "limit": self.decision.limit,
                "remaining": self.decision.remaining,
                "reset": self.decision.reset_at_ms,
                "retry_after": retry_after,
            })),
        )
            .into_response();

        self.decision.apply_headers(response.headers_mut());
        if let Ok(value) = retry_after.to_string().parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        response
    }
}

// ============================================================================
// LIMITER
// ============================================================================

/// Fixed-window rate limiter over a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter<S> {
    store: S,
    config: RateLimitConfig,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Rule on one request for `key` at time `now`.
    ///
    /// The event row is recorded whether the request is admitted or
    /// rejected, so hammering past the limit keeps the window full.
    /// Store read failures admit the request with a `Degraded` outcome;
    /// bookkeeping failures (record, prune) are logged and swallowed.
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window_start = now - self.config.window();
        let reset_at_ms = (now + self.config.window()).timestamp_millis();

        let owner = match self.store.owner_of_key(key).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(error = %e, "rate limit owner lookup failed, failing open");
                return self.degraded(reset_at_ms);
            }
        };

        let count = match self.store.count_events_since(key, window_start).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "rate limit count failed, failing open");
                return self.degraded(reset_at_ms);
            }
        };

        if let Err(e) = self.store.record_event(key, owner, now).await {
            warn!(error = %e, "failed to record rate limit event");
        }

        // Events older than two windows can never influence a count again.
        let prune_before = now - self.config.window() * 2;
        if let Err(e) = self.store.prune_events_before(key, prune_before).await {
            warn!(error = %e, "failed to prune rate limit events");
        }

        let outcome = if count < self.config.max_requests {
            RateLimitOutcome::Admitted
        } else {
            RateLimitOutcome::Rejected
        };

        RateLimitDecision {
            outcome,
            limit: self.config.max_requests,
            remaining: (self.config.max_requests - count).max(0),
            reset_at_ms,
        }
    }

    /// Rule on one request for `key` at the current time.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now()).await
    }

    fn degraded(&self, reset_at_ms: i64) -> RateLimitDecision {
        RateLimitDecision {
            outcome: RateLimitOutcome::Degraded,
            limit: self.config.max_requests,
            remaining: self.config.max_requests,
            reset_at_ms,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryRateStore;
    use super::*;
    use std::sync::atomic::Ordering;

    fn limiter(store: &MemoryRateStore) -> RateLimiter<&MemoryRateStore> {
        RateLimiter::new(store, RateLimitConfig::default())
    }

    #[tokio::test]
    async fn test_admits_under_the_limit() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let now = Utc::now();

        for i in 0..60 {
            let decision = limiter.check_at("upv_key", now).await;
            assert_eq!(decision.outcome, RateLimitOutcome::Admitted, "request {i}");
            assert_eq!(decision.remaining, 60 - i);
        }
    }

    #[tokio::test]
    async fn test_rejects_at_the_limit() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let now = Utc::now();

        for _ in 0..60 {
            assert!(limiter.check_at("upv_key", now).await.is_allowed());
        }
        let decision = limiter.check_at("upv_key", now).await;
        assert_eq!(decision.outcome, RateLimitOutcome::Rejected);
        assert_eq!(decision.remaining, 0);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_rejected_requests_still_recorded() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let now = Utc::now();

        for _ in 0..65 {
            limiter.check_at("upv_key", now).await;
        }
        // All 65 events land in the store, not just the admitted 60.
        assert_eq!(store.event_count("upv_key"), 65);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let now = Utc::now();

        for _ in 0..61 {
            limiter.check_at("upv_first", now).await;
        }
        let decision = limiter.check_at("upv_second", now).await;
        assert_eq!(decision.outcome, RateLimitOutcome::Admitted);
        assert_eq!(decision.remaining, 60);
    }

    #[tokio::test]
    async fn test_window_expiry_restores_capacity() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let start = Utc::now();

        for _ in 0..60 {
            limiter.check_at("upv_key", start).await;
        }
        assert!(!limiter.check_at("upv_key", start).await.is_allowed());

        let later = start + Duration::seconds(61);
        let decision = limiter.check_at("upv_key", later).await;
        assert_eq!(decision.outcome, RateLimitOutcome::Admitted);
    }

    #[tokio::test]
    async fn test_prunes_events_older_than_two_windows() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let start = Utc::now();

        limiter.check_at("upv_key", start).await;
        let much_later = start + Duration::seconds(180);
        limiter.check_at("upv_key", much_later).await;

        // Only the fresh event survives the sweep.
        assert_eq!(store.event_count("upv_key"), 1);
    }

    #[tokio::test]
    async fn test_fails_open_on_read_failure() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        store.fail_reads.store(true, Ordering::SeqCst);

        let decision = limiter.check_at("upv_key", Utc::now()).await;
        assert_eq!(decision.outcome, RateLimitOutcome::Degraded);
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining, 60);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_block() {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        store.fail_writes.store(true, Ordering::SeqCst);

        let decision = limiter.check_at("upv_key", Utc::now()).await;
        assert_eq!(decision.outcome, RateLimitOutcome::Admitted);
    }

    #[tokio::test]
    async fn test_rejected_response_carries_quota_metadata() -> Result<(), String> {
        let store = MemoryRateStore::default();
        let limiter = limiter(&store);
        let now = Utc::now();

        let mut decision = limiter.check_at("upv_key", now).await;
        for _ in 0..60 {
            decision = limiter.check_at("upv_key", now).await;
        }
        assert_eq!(decision.outcome, RateLimitOutcome::Rejected);

        let response = RateLimitExceeded { decision, now }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        for name in ["X-RateLimit-Limit", "X-RateLimit-Remaining", "X-RateLimit-Reset"] {
            assert!(response.headers().contains_key(name), "missing header {name}");
        }

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let json: serde_json::Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["limit"], 60);
        assert_eq!(json["remaining"], 0);
        assert!(json["reset"].is_i64(), "reset missing from body: {json}");
        assert!(json["retry_after"].is_u64());
        Ok(())
    }

    #[test]
    fn test_apply_headers_sets_quota_headers() {
        let decision = RateLimitDecision {
            outcome: RateLimitOutcome::Admitted,
            limit: 60,
            remaining: 59,
            reset_at_ms: 1_700_000_060_000,
        };

        let mut headers = HeaderMap::new();
        decision.apply_headers(&mut headers);

        assert_eq!(headers["X-RateLimit-Limit"], "60");
        assert_eq!(headers["X-RateLimit-Remaining"], "59");
        assert_eq!(headers["X-RateLimit-Reset"], "1700000060000");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let decision = RateLimitDecision {
            outcome: RateLimitOutcome::Rejected,
            limit: 60,
            remaining: 0,
            reset_at_ms: now.timestamp_millis() + 1500,
        };
        assert_eq!(decision.retry_after_secs(now), 2);

        let expired = RateLimitDecision {
            reset_at_ms: now.timestamp_millis() - 10,
            ..decision
        };
        assert_eq!(expired.retry_after_secs(now), 0);
    }
}
