//! Upview API Server Entry Point
//!
//! Bootstraps configuration, wires the database-backed limiter and
//! avatar resolver, and starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use upview_api::{
    auth::RemoteSessionVerifier, avatar::AvatarResolver, classify, create_api_router,
    rate_limit::RateLimitConfig, rate_limit::RateLimiter, roblox::RobloxClient,
    routes::billing::BillingState, ApiConfig, ApiError, ApiResult, AppState, DbClient, DbConfig,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing();

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;

    let api_config = ApiConfig::from_env();
    let http_client = reqwest::Client::new();

    let limiter = Arc::new(RateLimiter::new(db.clone(), RateLimitConfig::from_env()));

    let roblox = RobloxClient::from_env(http_client.clone());
    let avatars = Arc::new(AvatarResolver::new(db.clone(), roblox.clone()));

    let classifier: Arc<dyn classify::FeedbackClassifier> =
        match classify::InferenceClassifier::from_env(http_client.clone()) {
            Some(classifier) => Arc::new(classifier),
            None => {
                tracing::warn!("no classifier configured, all feedback will categorize as other");
                Arc::new(classify::NoopClassifier)
            }
        };

    let billing = Arc::new(BillingState::from_env(http_client.clone()));
    let verifier = Arc::new(RemoteSessionVerifier::from_env(http_client)?);

    let bind_addr = api_config.bind_addr.clone();
    let state = AppState {
        db,
        limiter,
        avatars,
        classifier,
        roblox,
        billing,
        config: Arc::new(api_config),
        start_time: std::time::Instant::now(),
    };

    let app: Router = create_api_router(state, verifier)?;

    tracing::info!(addr = %bind_addr, "Starting Upview API server");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", bind_addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("upview_api=info,tower_http=info"));

    // JSON logs in production, human-readable otherwise.
    if std::env::var("UPVIEW_LOG_FORMAT").as_deref() == Ok("json") {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
