//! Avatar Resolution Module
//!
//! Resolves avatar image URLs for two kinds of subjects:
//!
//! - `player`: a game player persisted in our store. Lookups go through
//!   a cache table with a 24-hour freshness horizon; upstream results
//!   are written back.
//! - `user`: a dashboard user. Resolution reads the linked platform
//!   username from the profile and always goes upstream. User avatars
//!   are not cached: the linked account can change at any time and the
//!   call volume is dashboard-scale.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use upview_core::{AvatarKind, EntityId, Timestamp};

// ============================================================================
// STORE AND LOOKUP SEAMS
// ============================================================================

/// A cached avatar row.
#[derive(Debug, Clone)]
pub struct CachedAvatar {
    pub image_url: String,
    pub updated_at: Timestamp,
}

/// Persistence operations the resolver needs.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Read the cached avatar for a player, if any.
    async fn cached_avatar(&self, player_id: EntityId) -> ApiResult<Option<CachedAvatar>>;

    /// Write or refresh a player's cached avatar.
    async fn upsert_avatar(
        &self,
        player_id: EntityId,
        user_id: EntityId,
        image_url: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<()>;

    /// The stored display name for a player.
    async fn player_name(&self, player_id: EntityId) -> ApiResult<Option<String>>;

    /// The platform username linked to a dashboard user's profile.
    async fn linked_username(&self, user_id: EntityId) -> ApiResult<Option<String>>;
}

/// Upstream username-to-avatar resolution. Implemented by the Roblox
/// client; tests substitute a counting fake.
#[async_trait]
pub trait AvatarLookup: Send + Sync {
    /// Resolve a username to a headshot image URL. `Ok(None)` means the
    /// platform does not know the username.
    async fn avatar_url_for_username(&self, username: &str) -> ApiResult<Option<String>>;
}

// ============================================================================
// RESOLVER
// ============================================================================

/// How long a cached player avatar stays fresh.
pub const AVATAR_FRESHNESS_HOURS: i64 = 24;

/// Resolved avatar plus where it came from, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAvatar {
    /// Served from the cache without an upstream call.
    Cached(String),
    /// Fetched upstream (and cached, for players).
    Fetched(String),
}

impl ResolvedAvatar {
    pub fn image_url(&self) -> &str {
        match self {
            ResolvedAvatar::Cached(url) | ResolvedAvatar::Fetched(url) => url,
        }
    }
}

/// Avatar resolver over an [`AvatarStore`] and an [`AvatarLookup`].
#[derive(Clone)]
pub struct AvatarResolver<S, L> {
    store: S,
    lookup: L,
    freshness: Duration,
}

impl<S: AvatarStore, L: AvatarLookup> AvatarResolver<S, L> {
    pub fn new(store: S, lookup: L) -> Self {
        Self {
            store,
            lookup,
            freshness: Duration::hours(AVATAR_FRESHNESS_HOURS),
        }
    }

    #[cfg(test)]
    fn with_freshness(store: S, lookup: L, freshness: Duration) -> Self {
        Self {
            store,
            lookup,
            freshness,
        }
    }

    /// Resolve an avatar for the given subject on behalf of `user_id`.
    ///
    /// Unresolvable subjects are not-found errors, kept distinct from
    /// upstream failures (which surface as `UpstreamError`).
    pub async fn resolve(
        &self,
        kind: AvatarKind,
        subject_id: EntityId,
        user_id: EntityId,
    ) -> ApiResult<ResolvedAvatar> {
        match kind {
            AvatarKind::User => self.resolve_user(subject_id).await,
            AvatarKind::Player => self.resolve_player(subject_id, user_id).await,
        }
    }

    async fn resolve_user(&self, user_id: EntityId) -> ApiResult<ResolvedAvatar> {
        let Some(username) = self.store.linked_username(user_id).await? else {
            debug!(%user_id, "no linked platform username for user");
            return Err(ApiError::not_found("No linked Roblox username for user"));
        };

        let url = self
            .lookup
            .avatar_url_for_username(&username)
            .await?
            .ok_or_else(|| ApiError::not_found("Roblox user not found for linked username"))?;

        Ok(ResolvedAvatar::Fetched(url))
    }

    async fn resolve_player(
        &self,
        player_id: EntityId,
        user_id: EntityId,
    ) -> ApiResult<ResolvedAvatar> {
        let now = Utc::now();

        if let Some(cached) = self.store.cached_avatar(player_id).await? {
            if now - cached.updated_at < self.freshness {
                return Ok(ResolvedAvatar::Cached(cached.image_url));
            }
        }

        let Some(name) = self.store.player_name(player_id).await? else {
            debug!(%player_id, "player has no stored name");
            return Err(ApiError::player_not_found(player_id));
        };

        let url = self
            .lookup
            .avatar_url_for_username(&name)
            .await?
            .ok_or_else(|| ApiError::player_not_found(&name))?;

        // Cache write failures degrade to a miss next time, nothing more.
        if let Err(e) = self.store.upsert_avatar(player_id, user_id, &url, now).await {
            warn!(%player_id, error = %e, "failed to cache player avatar");
        }

        Ok(ResolvedAvatar::Fetched(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use upview_core::new_entity_id;

    #[derive(Default)]
    struct MemoryAvatarStore {
        avatars: Mutex<HashMap<EntityId, CachedAvatar>>,
        player_names: Mutex<HashMap<EntityId, String>>,
        usernames: Mutex<HashMap<EntityId, String>>,
    }

    #[async_trait]
    impl AvatarStore for &MemoryAvatarStore {
        async fn cached_avatar(&self, player_id: EntityId) -> ApiResult<Option<CachedAvatar>> {
            Ok(self.avatars.lock().unwrap().get(&player_id).cloned())
        }

        async fn upsert_avatar(
            &self,
            player_id: EntityId,
            _user_id: EntityId,
            image_url: &str,
            at: DateTime<Utc>,
        ) -> ApiResult<()> {
            self.avatars.lock().unwrap().insert(
                player_id,
                CachedAvatar {
                    image_url: image_url.to_string(),
                    updated_at: at,
                },
            );
            Ok(())
        }

        async fn player_name(&self, player_id: EntityId) -> ApiResult<Option<String>> {
            Ok(self.player_names.lock().unwrap().get(&player_id).cloned())
        }

        async fn linked_username(&self, user_id: EntityId) -> ApiResult<Option<String>> {
            Ok(self.usernames.lock().unwrap().get(&user_id).cloned())
        }
    }

    /// Fake upstream that counts calls and maps every known username to
    /// a deterministic URL.
    #[derive(Default)]
    struct CountingLookup {
        calls: AtomicUsize,
        unknown: Mutex<Vec<String>>,
    }

    impl CountingLookup {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AvatarLookup for &CountingLookup {
        async fn avatar_url_for_username(&self, username: &str) -> ApiResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unknown.lock().unwrap().iter().any(|u| u == username) {
                return Ok(None);
            }
            Ok(Some(format!("https://cdn.example.com/{username}.png")))
        }
    }

    #[tokio::test]
    async fn test_player_miss_fetches_and_caches() -> ApiResult<()> {
        let store = MemoryAvatarStore::default();
        let lookup = CountingLookup::default();
        let resolver = AvatarResolver::new(&store, &lookup);

        let player = new_entity_id();
        let user = new_entity_id();
        store
            .player_names
            .lock()
            .unwrap()
            .insert(player, "builderman".to_string());

        let resolved = resolver.resolve(AvatarKind::Player, player, user).await?;
        assert_eq!(
            resolved,
            ResolvedAvatar::Fetched("https://cdn.example.com/builderman.png".to_string())
        );
        assert_eq!(lookup.calls(), 1);
        assert!(store.avatars.lock().unwrap().contains_key(&player));
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_player_cache_skips_upstream() -> ApiResult<()> {
        let store = MemoryAvatarStore::default();
        let lookup = CountingLookup::default();
        let resolver = AvatarResolver::new(&store, &lookup);

        let player = new_entity_id();
        let user = new_entity_id();
        store
            .player_names
            .lock()
            .unwrap()
            .insert(player, "builderman".to_string());

        resolver.resolve(AvatarKind::Player, player, user).await?;
        let second = resolver.resolve(AvatarKind::Player, player, user).await?;

        assert!(matches!(second, ResolvedAvatar::Cached(_)));
        assert_eq!(lookup.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_player_cache_refetches() -> ApiResult<()> {
        let store = MemoryAvatarStore::default();
        let lookup = CountingLookup::default();
        let resolver =
            AvatarResolver::with_freshness(&store, &lookup, Duration::hours(24));

        let player = new_entity_id();
        let user = new_entity_id();
        store
            .player_names
            .lock()
            .unwrap()
            .insert(player, "builderman".to_string());
        store.avatars.lock().unwrap().insert(
            player,
            CachedAvatar {
                image_url: "https://cdn.example.com/stale.png".to_string(),
                updated_at: Utc::now() - Duration::hours(25),
            },
        );

        let resolved = resolver.resolve(AvatarKind::Player, player, user).await?;
        assert!(matches!(resolved, ResolvedAvatar::Fetched(_)));
        assert_eq!(lookup.calls(), 1);

        let refreshed = store.avatars.lock().unwrap().get(&player).cloned();
        assert_eq!(
            refreshed.map(|c| c.image_url),
            Some("https://cdn.example.com/builderman.png".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_user_avatars_are_never_cached() -> ApiResult<()> {
        let store = MemoryAvatarStore::default();
        let lookup = CountingLookup::default();
        let resolver = AvatarResolver::new(&store, &lookup);

        let user = new_entity_id();
        store
            .usernames
            .lock()
            .unwrap()
            .insert(user, "builderman".to_string());

        resolver.resolve(AvatarKind::User, user, user).await?;
        resolver.resolve(AvatarKind::User, user, user).await?;

        // Each resolution goes upstream, nothing is written back.
        assert_eq!(lookup.calls(), 2);
        assert!(store.avatars.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_subjects_are_not_found() {
        let store = MemoryAvatarStore::default();
        let lookup = CountingLookup::default();
        let resolver = AvatarResolver::new(&store, &lookup);

        let user = new_entity_id();
        // No linked username, no player name.
        let err = resolver
            .resolve(AvatarKind::User, user, user)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);

        let err = resolver
            .resolve(AvatarKind::Player, new_entity_id(), user)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlayerNotFound);

        // Neither miss reaches the upstream API.
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_username_unknown_upstream_is_not_found() {
        let store = MemoryAvatarStore::default();
        let lookup = CountingLookup::default();
        let resolver = AvatarResolver::new(&store, &lookup);

        let user = new_entity_id();
        store
            .usernames
            .lock()
            .unwrap()
            .insert(user, "ghost".to_string());
        lookup.unknown.lock().unwrap().push("ghost".to_string());

        let err = resolver
            .resolve(AvatarKind::User, user, user)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
    }
}
