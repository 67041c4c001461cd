//! Billing Routes
//!
//! Stripe checkout and webhook endpoints:
//! - POST /api/stripe/create-checkout (session auth) - start a
//!   subscription checkout with a 14-day trial
//! - POST /api/stripe/webhook (signature auth) - subscription lifecycle
//!   callbacks
//!
//! Checkout is refused while the caller already holds a trialing or
//! active subscription.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{DbClient, SubscriptionUpsert};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;

/// Trial length granted on new subscriptions.
const TRIAL_PERIOD_DAYS: u32 = 14;

/// Webhook timestamps older than this are rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

// ============================================================================
// STATE
// ============================================================================

/// Shared state for billing routes.
#[derive(Clone)]
pub struct BillingState {
    pub http_client: reqwest::Client,
    /// Stripe secret key
    pub secret_key: Option<String>,
    /// Stripe webhook signing secret
    pub webhook_secret: Option<String>,
    /// Price ID for the subscription plan
    pub price_id: Option<String>,
    /// Stripe API base URL (overridable for tests)
    pub api_url: String,
    /// Where Stripe redirects after a successful checkout
    pub success_url: String,
    /// Where Stripe redirects after a canceled checkout
    pub cancel_url: String,
}

impl BillingState {
    /// Create billing state from environment variables.
    ///
    /// # Environment Variables
    /// - `UPVIEW_STRIPE_SECRET_KEY`
    /// - `UPVIEW_STRIPE_WEBHOOK_SECRET`
    /// - `UPVIEW_STRIPE_PRICE_ID`
    /// - `UPVIEW_STRIPE_API_URL` (default: https://api.stripe.com)
    /// - `UPVIEW_CHECKOUT_SUCCESS_URL` / `UPVIEW_CHECKOUT_CANCEL_URL`
    pub fn from_env(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            secret_key: std::env::var("UPVIEW_STRIPE_SECRET_KEY").ok(),
            webhook_secret: std::env::var("UPVIEW_STRIPE_WEBHOOK_SECRET").ok(),
            price_id: std::env::var("UPVIEW_STRIPE_PRICE_ID").ok(),
            api_url: std::env::var("UPVIEW_STRIPE_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            success_url: std::env::var("UPVIEW_CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| "https://upview.dev/dashboard?checkout=success".to_string()),
            cancel_url: std::env::var("UPVIEW_CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "https://upview.dev/pricing".to_string()),
        }
    }

    fn checkout_sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.api_url)
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Checkout session response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CheckoutResponse {
    /// Hosted checkout page URL
    pub url: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/stripe/create-checkout - Start a subscription checkout.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/stripe/create-checkout",
    tag = "Billing",
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Caller already subscribed"),
        (status = 401, description = "Not authenticated"),
        (status = 503, description = "Billing not configured"),
    ),
))]
pub async fn create_checkout(
    State(db): State<DbClient>,
    State(state): State<Arc<BillingState>>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<CheckoutResponse>> {
    let secret_key = state
        .secret_key
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Billing is not configured"))?;
    let price_id = state
        .price_id
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Billing is not configured"))?;

    // One entitling subscription per user.
    if db.subscription_entitled_exists(auth.user_id).await? {
        return Err(ApiError::invalid_input(
            "You already have an active subscription",
        ));
    }

    let trial_days = TRIAL_PERIOD_DAYS.to_string();
    let user_id = auth.user_id.to_string();
    let mut params: Vec<(&str, &str)> = vec![
        ("mode", "subscription"),
        ("line_items[0][price]", price_id),
        ("line_items[0][quantity]", "1"),
        ("subscription_data[trial_period_days]", &trial_days),
        ("success_url", &state.success_url),
        ("cancel_url", &state.cancel_url),
        ("metadata[userId]", &user_id),
        ("client_reference_id", &user_id),
    ];
    if let Some(email) = auth.email.as_deref() {
        params.push(("customer_email", email));
    }

    let response = state
        .http_client
        .post(state.checkout_sessions_url())
        .bearer_auth(secret_key)
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body, "checkout session creation failed");
        return Err(ApiError::upstream(format!(
            "Payment provider returned {}",
            status
        )));
    }

    let session: serde_json::Value = response.json().await?;
    let url = session
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::upstream("Checkout session response missing url"))?;

    info!(user_id = %auth.user_id, "created checkout session");

    Ok(Json(CheckoutResponse {
        url: url.to_string(),
    }))
}

/// POST /api/stripe/webhook - Subscription lifecycle callbacks.
pub async fn webhook(
    State(db): State<DbClient>,
    State(state): State<Arc<BillingState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Webhook secret not configured"))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing webhook signature"))?;

    let now = chrono::Utc::now().timestamp();
    if !verify_stripe_signature(&body, signature, secret, now, SIGNATURE_TOLERANCE_SECS) {
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    }

    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_input(format!("Invalid webhook payload: {}", e)))?;

    let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let object = event
        .pointer("/data/object")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    match event_type {
        "checkout.session.completed" => {
            handle_checkout_completed(&db, &state, &object).await?;
        }
        "customer.subscription.updated" | "customer.subscription.created" => {
            handle_subscription_event(&db, &object).await?;
        }
        "customer.subscription.deleted" => {
            handle_subscription_deleted(&db, &object).await?;
        }
        other => {
            debug!(event_type = other, "ignoring webhook event");
        }
    }

    Ok(StatusCode::OK)
}

// ============================================================================
// EVENT HANDLERS
// ============================================================================

async fn handle_checkout_completed(
    db: &DbClient,
    state: &BillingState,
    object: &serde_json::Value,
) -> ApiResult<()> {
    let user_id = object
        .pointer("/metadata/userId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::invalid_input("Checkout session missing userId metadata"))?;

    let customer_id = object
        .get("customer")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let subscription_id = object
        .get("subscription")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    db.subscription_upsert(&SubscriptionUpsert {
        user_id,
        stripe_customer_id: customer_id,
        stripe_subscription_id: subscription_id,
        // Checkout grants a trial; the subsequent subscription events
        // carry the authoritative status.
        status: "trialing".to_string(),
        plan_id: state.price_id.clone().unwrap_or_default(),
        trial_end: None,
    })
    .await?;

    info!(%user_id, "subscription created from checkout");
    Ok(())
}

async fn handle_subscription_event(db: &DbClient, object: &serde_json::Value) -> ApiResult<()> {
    let subscription_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::invalid_input("Subscription event missing id"))?;
    let status = object
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("incomplete");
    let trial_end = object
        .get("trial_end")
        .and_then(|v| v.as_i64())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));

    let updated = db
        .subscription_update_status(subscription_id, status, trial_end)
        .await?;

    if !updated {
        // Events can arrive before checkout.session.completed.
        debug!(subscription_id, "subscription event for unknown subscription");
    }

    Ok(())
}

async fn handle_subscription_deleted(db: &DbClient, object: &serde_json::Value) -> ApiResult<()> {
    let subscription_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::invalid_input("Subscription event missing id"))?;

    db.subscription_update_status(subscription_id, "canceled", None)
        .await?;

    info!(subscription_id, "subscription canceled");
    Ok(())
}

// ============================================================================
// SIGNATURE VERIFICATION
// ============================================================================

/// Verify a Stripe webhook signature header.
///
/// The header carries `t=<unix seconds>,v1=<hex hmac>[,v1=...]`; the
/// signed payload is `"{t}.{body}"` under HMAC-SHA256 with the signing
/// secret. Timestamps outside `tolerance_secs` of `now` are rejected to
/// blunt replay.
fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> bool {
    type HmacSha256 = Hmac<Sha256>;

    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    if candidates.is_empty() || (now - timestamp).abs() > tolerance_secs {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    candidates.iter().any(|candidate| *candidate == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = b"{\"type\":\"checkout.session.completed\"}";
        let secret = "whsec_test";
        let now = 1_700_000_000;

        let header = sign(payload, secret, now);
        assert!(verify_stripe_signature(payload, &header, secret, now, 300));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"payload";
        let now = 1_700_000_000;

        let header = sign(payload, "whsec_test", now);
        assert!(!verify_stripe_signature(payload, &header, "whsec_other", now, 300));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let secret = "whsec_test";
        let now = 1_700_000_000;

        let header = sign(b"original", secret, now);
        assert!(!verify_stripe_signature(b"tampered", &header, secret, now, 300));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"payload";
        let secret = "whsec_test";
        let now = 1_700_000_000;

        let header = sign(payload, secret, now - 301);
        assert!(!verify_stripe_signature(payload, &header, secret, now, 300));

        let header = sign(payload, secret, now - 299);
        assert!(verify_stripe_signature(payload, &header, secret, now, 300));
    }

    #[test]
    fn test_garbage_header_rejected() {
        let payload = b"payload";
        assert!(!verify_stripe_signature(payload, "", "whsec_test", 0, 300));
        assert!(!verify_stripe_signature(payload, "t=abc,v1=", "whsec_test", 0, 300));
        assert!(!verify_stripe_signature(payload, "v1=deadbeef", "whsec_test", 0, 300));
    }

    #[test]
    fn test_multiple_v1_candidates() {
        let payload = b"payload";
        let secret = "whsec_test";
        let now = 1_700_000_000;

        // Key-rotation style header: a bad candidate followed by a good one.
        let good = sign(payload, secret, now);
        let good_sig = good.split("v1=").nth(1).unwrap_or_default();
        let header = format!("t={},v1=deadbeef,v1={}", now, good_sig);
        assert!(verify_stripe_signature(payload, &header, secret, now, 300));
    }
}
