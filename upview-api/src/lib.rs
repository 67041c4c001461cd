//! Upview API - REST backend for the player feedback platform
//!
//! This crate provides the HTTP surface between the dashboard, game
//! servers, and the third-party providers the product leans on:
//!
//! - PostgreSQL persistence via deadpool-postgres ([`db`])
//! - Per-API-key fixed-window rate limiting ([`rate_limit`])
//! - Cached avatar resolution against the Roblox APIs ([`avatar`], [`roblox`])
//! - Session and API-key authentication ([`auth`], [`middleware`])
//! - Feedback classification ([`classify`])
//! - Stripe checkout and webhooks ([`routes::billing`])
//!
//! Route handlers live in [`routes`]; everything else is the plumbing
//! they stand on.

pub mod auth;
pub mod avatar;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod rate_limit;
pub mod roblox;
pub mod routes;
pub mod state;

#[cfg(feature = "openapi")]
pub mod openapi;

pub use auth::{generate_api_key, is_valid_key_format, AuthContext, SessionVerifier};
pub use avatar::{AvatarLookup, AvatarResolver, AvatarStore};
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimitOutcome, RateLimiter};
pub use routes::create_api_router;
pub use state::AppState;
