//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres and a typed
//! `DbClient` wrapper. All SQL in the service lives in this module;
//! route handlers and the core components only see typed async
//! operations.
//!
//! The schema is defined in `migrations/001_init.sql`.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use upview_core::{new_entity_id, EntityId, FeedbackCategory, Timestamp};
use uuid::Uuid;

use crate::avatar::{AvatarStore, CachedAvatar};
use crate::rate_limit::RateLimitStore;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "upview".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("UPVIEW_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("UPVIEW_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("UPVIEW_DB_NAME").unwrap_or_else(|_| "upview".to_string()),
            user: std::env::var("UPVIEW_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("UPVIEW_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("UPVIEW_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("UPVIEW_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// RECORD TYPES
// ============================================================================

/// A stored API key and its ownership.
///
/// `workspace_id` is `None` until the owner has created a workspace;
/// that is a valid state distinct from "key not found".
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub key: String,
    pub user_id: EntityId,
    pub workspace_id: Option<EntityId>,
    pub created_at: Timestamp,
    pub last_used_at: Option<Timestamp>,
}

/// A stored user profile with the linked Roblox identity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserProfileRecord {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roblox_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roblox_username: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// A stored workspace.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkspaceRecord {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub owner_id: EntityId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Parameters for inserting a feedback row.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub user_id: EntityId,
    pub workspace_id: EntityId,
    pub game_id: Option<String>,
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub text: String,
    pub category: FeedbackCategory,
}

/// Parameters for upserting a subscription record from a webhook event.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub user_id: EntityId,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub status: String,
    pub plan_id: String,
    pub trial_end: Option<Timestamp>,
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool and provides typed
/// operations over the Upview schema.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// Simple connectivity check used by the readiness probe.
    pub async fn ping(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    // ========================================================================
    // API KEY OPERATIONS
    // ========================================================================

    /// Resolve an API key to its owning user and workspace.
    ///
    /// Pure lookup; returns `None` for unknown keys. A found key with
    /// `workspace_id = None` is surfaced as such, not conflated with
    /// "not found".
    pub async fn api_key_lookup(&self, key: &str) -> ApiResult<Option<ApiKeyRecord>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt(
                "SELECT key, user_id, workspace_id, created_at, last_used_at \
                 FROM api_keys WHERE key = $1",
                &[&key],
            )
            .await?;

        Ok(row.map(|row| ApiKeyRecord {
            key: row.get(0),
            user_id: row.get(1),
            workspace_id: row.get(2),
            created_at: row.get(3),
            last_used_at: row.get(4),
        }))
    }

    /// Get the current API key for a user, if one has been issued.
    pub async fn api_key_for_user(&self, user_id: EntityId) -> ApiResult<Option<String>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt("SELECT key FROM api_keys WHERE user_id = $1", &[&user_id])
            .await?;

        Ok(row.map(|row| row.get(0)))
    }

    /// Issue a new API key for a user, superseding any existing key.
    ///
    /// Delete-then-insert runs in a single transaction so at most one
    /// live key exists per user at any point. The new key is linked to
    /// the user's oldest workspace when one exists.
    pub async fn api_key_issue(&self, user_id: EntityId, key: &str) -> ApiResult<ApiKeyRecord> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let workspace_id: Option<Uuid> = tx
            .query_opt(
                "SELECT id FROM workspaces WHERE owner_id = $1 \
                 ORDER BY created_at ASC LIMIT 1",
                &[&user_id],
            )
            .await?
            .map(|row| row.get(0));

        tx.execute("DELETE FROM api_keys WHERE user_id = $1", &[&user_id])
            .await?;

        let row = tx
            .query_one(
                "INSERT INTO api_keys (key, user_id, workspace_id, created_at) \
                 VALUES ($1, $2, $3, now()) \
                 RETURNING key, user_id, workspace_id, created_at, last_used_at",
                &[&key, &user_id, &workspace_id],
            )
            .await?;

        tx.commit().await?;

        Ok(ApiKeyRecord {
            key: row.get(0),
            user_id: row.get(1),
            workspace_id: row.get(2),
            created_at: row.get(3),
            last_used_at: row.get(4),
        })
    }

    /// Update the last-used timestamp on a key.
    ///
    /// Callers treat failures as non-fatal: the stamp is advisory.
    pub async fn api_key_touch(&self, key: &str) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE api_keys SET last_used_at = now() WHERE key = $1",
            &[&key],
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // PROFILE / PLAYER OPERATIONS
    // ========================================================================

    /// Get a user's profile, if one exists.
    pub async fn profile_get(&self, user_id: EntityId) -> ApiResult<Option<UserProfileRecord>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt(
                "SELECT user_id, roblox_id, roblox_username, updated_at \
                 FROM user_profiles WHERE user_id = $1",
                &[&user_id],
            )
            .await?;

        Ok(row.map(|row| UserProfileRecord {
            user_id: row.get(0),
            roblox_id: row.get(1),
            roblox_username: row.get(2),
            updated_at: row.get(3),
        }))
    }

    /// Upsert a user's profile with a linked Roblox identity.
    pub async fn profile_upsert(
        &self,
        user_id: EntityId,
        roblox_id: Option<&str>,
        roblox_username: Option<&str>,
    ) -> ApiResult<UserProfileRecord> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_one(
                "INSERT INTO user_profiles (user_id, roblox_id, roblox_username, updated_at) \
                 VALUES ($1, $2, $3, now()) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                     roblox_id = EXCLUDED.roblox_id, \
                     roblox_username = EXCLUDED.roblox_username, \
                     updated_at = now() \
                 RETURNING user_id, roblox_id, roblox_username, updated_at",
                &[&user_id, &roblox_id, &roblox_username],
            )
            .await?;

        Ok(UserProfileRecord {
            user_id: row.get(0),
            roblox_id: row.get(1),
            roblox_username: row.get(2),
            updated_at: row.get(3),
        })
    }

    // ========================================================================
    // WORKSPACE OPERATIONS
    // ========================================================================

    /// List a user's workspaces, oldest first.
    pub async fn workspace_list(&self, owner_id: EntityId) -> ApiResult<Vec<WorkspaceRecord>> {
        let conn = self.get_conn().await?;

        let rows = conn
            .query(
                "SELECT id, owner_id, name, description, created_at \
                 FROM workspaces WHERE owner_id = $1 ORDER BY created_at ASC",
                &[&owner_id],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| WorkspaceRecord {
                id: row.get(0),
                owner_id: row.get(1),
                name: row.get(2),
                description: row.get(3),
                created_at: row.get(4),
            })
            .collect())
    }

    /// Create a workspace for a user.
    pub async fn workspace_create(
        &self,
        owner_id: EntityId,
        name: &str,
        description: Option<&str>,
    ) -> ApiResult<WorkspaceRecord> {
        let conn = self.get_conn().await?;
        let id = new_entity_id();

        let row = conn
            .query_one(
                "INSERT INTO workspaces (id, owner_id, name, description, created_at) \
                 VALUES ($1, $2, $3, $4, now()) \
                 RETURNING id, owner_id, name, description, created_at",
                &[&id, &owner_id, &name, &description],
            )
            .await?;

        Ok(WorkspaceRecord {
            id: row.get(0),
            owner_id: row.get(1),
            name: row.get(2),
            description: row.get(3),
            created_at: row.get(4),
        })
    }

    // ========================================================================
    // SUBSCRIPTION OPERATIONS
    // ========================================================================

    /// Whether the user currently has an entitling subscription
    /// (status `trialing` or `active`).
    pub async fn subscription_entitled_exists(&self, user_id: EntityId) -> ApiResult<bool> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_one(
                "SELECT count(*) FROM subscriptions \
                 WHERE user_id = $1 AND status IN ('trialing', 'active')",
                &[&user_id],
            )
            .await?;

        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    /// Idempotent upsert of a subscription record, keyed by user.
    pub async fn subscription_upsert(&self, sub: &SubscriptionUpsert) -> ApiResult<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO subscriptions \
                 (user_id, stripe_customer_id, stripe_subscription_id, status, plan_id, trial_end) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 stripe_customer_id = EXCLUDED.stripe_customer_id, \
                 stripe_subscription_id = EXCLUDED.stripe_subscription_id, \
                 status = EXCLUDED.status, \
                 plan_id = EXCLUDED.plan_id, \
                 trial_end = EXCLUDED.trial_end",
            &[
                &sub.user_id,
                &sub.stripe_customer_id,
                &sub.stripe_subscription_id,
                &sub.status,
                &sub.plan_id,
                &sub.trial_end,
            ],
        )
        .await?;

        Ok(())
    }

    /// Update status and trial end for a subscription by provider id.
    /// Returns whether a row was updated.
    pub async fn subscription_update_status(
        &self,
        stripe_subscription_id: &str,
        status: &str,
        trial_end: Option<Timestamp>,
    ) -> ApiResult<bool> {
        let conn = self.get_conn().await?;

        let updated = conn
            .execute(
                "UPDATE subscriptions SET status = $2, trial_end = $3 \
                 WHERE stripe_subscription_id = $1",
                &[&stripe_subscription_id, &status, &trial_end],
            )
            .await?;

        Ok(updated > 0)
    }

    // ========================================================================
    // FEEDBACK OPERATIONS
    // ========================================================================

    /// Insert a classified feedback row.
    pub async fn feedback_insert(&self, feedback: &NewFeedback) -> ApiResult<EntityId> {
        let conn = self.get_conn().await?;
        let id = new_entity_id();

        conn.execute(
            "INSERT INTO feedback \
                 (id, user_id, workspace_id, game_id, player_id, player_name, text, category, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())",
            &[
                &id,
                &feedback.user_id,
                &feedback.workspace_id,
                &feedback.game_id,
                &feedback.player_id,
                &feedback.player_name,
                &feedback.text,
                &feedback.category.as_str(),
            ],
        )
        .await?;

        Ok(id)
    }
}

// ============================================================================
// RATE LIMIT STORE
// ============================================================================

#[async_trait]
impl RateLimitStore for DbClient {
    async fn owner_of_key(&self, key: &str) -> ApiResult<Option<EntityId>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt("SELECT user_id FROM api_keys WHERE key = $1", &[&key])
            .await?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn count_events_since(&self, key: &str, since: DateTime<Utc>) -> ApiResult<i64> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_one(
                "SELECT count(*) FROM rate_events WHERE key = $1 AND created_at >= $2",
                &[&key, &since],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn record_event(
        &self,
        key: &str,
        user_id: Option<EntityId>,
        at: DateTime<Utc>,
    ) -> ApiResult<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO rate_events (key, user_id, created_at) VALUES ($1, $2, $3)",
            &[&key, &user_id, &at],
        )
        .await?;

        Ok(())
    }

    async fn prune_events_before(&self, key: &str, before: DateTime<Utc>) -> ApiResult<u64> {
        let conn = self.get_conn().await?;

        let deleted = conn
            .execute(
                "DELETE FROM rate_events WHERE key = $1 AND created_at < $2",
                &[&key, &before],
            )
            .await?;

        Ok(deleted)
    }
}

// ============================================================================
// AVATAR STORE
// ============================================================================

#[async_trait]
impl AvatarStore for DbClient {
    async fn cached_avatar(&self, player_id: EntityId) -> ApiResult<Option<CachedAvatar>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt(
                "SELECT image_url, updated_at FROM player_avatars WHERE player_id = $1",
                &[&player_id],
            )
            .await?;

        Ok(row.map(|row| CachedAvatar {
            image_url: row.get(0),
            updated_at: row.get(1),
        }))
    }

    async fn upsert_avatar(
        &self,
        player_id: EntityId,
        user_id: EntityId,
        image_url: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO player_avatars (player_id, user_id, image_url, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (player_id) DO UPDATE SET \
                 user_id = EXCLUDED.user_id, \
                 image_url = EXCLUDED.image_url, \
                 updated_at = EXCLUDED.updated_at",
            &[&player_id, &user_id, &image_url, &at],
        )
        .await?;

        Ok(())
    }

    async fn player_name(&self, player_id: EntityId) -> ApiResult<Option<String>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt("SELECT name FROM players WHERE id = $1", &[&player_id])
            .await?;

        // A player row with a NULL name is as unresolvable as a missing row.
        Ok(row.and_then(|row| row.get::<_, Option<String>>(0)))
    }

    async fn linked_username(&self, user_id: EntityId) -> ApiResult<Option<String>> {
        let conn = self.get_conn().await?;

        let row = conn
            .query_opt(
                "SELECT roblox_username FROM user_profiles WHERE user_id = $1",
                &[&user_id],
            )
            .await?;

        Ok(row.and_then(|row| row.get::<_, Option<String>>(0)))
    }
}
