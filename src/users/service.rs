// src/users/service.rs
//! Profile & relationship component
//!
//! Reads go cache-first and fall back to the store, writing the result back.
//! Writes commit to the store, drop every cache entry they made stale, then
//! publish an event. A failed publish after a commit is only logged.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::avatar::{image_extension, is_valid_image_type, AvatarStore};
use super::models::{
    FullUser, Relation, RelationSide, RelatedUser, SocialPlatform, User, UserPatch,
};
use super::repository::{StoreError, UserStore};
use super::social::{classify_link, LinkProber};
use super::validators::{has_disallowed_characters, normalize_username};
use crate::cache::{keys, CacheClient, CacheError};
use crate::common::config::ProfileConfig;
use crate::common::{internal, ErrorKind, ServiceError};
use crate::events::EventBus;

pub struct UserService {
    store: Arc<dyn UserStore>,
    cache: CacheClient,
    events: EventBus,
    avatars: Arc<dyn AvatarStore>,
    links: Arc<dyn LinkProber>,
    config: ProfileConfig,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: CacheClient,
        events: EventBus,
        avatars: Arc<dyn AvatarStore>,
        links: Arc<dyn LinkProber>,
        config: ProfileConfig,
    ) -> Self {
        Self {
            store,
            cache,
            events,
            avatars,
            links,
            config,
        }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    // ============================================================================
    // Cache helpers
    // ============================================================================

    /// Cache probe. A corrupt entry counts as a miss.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ServiceError> {
        match self.cache.get_json::<T>(key).await {
            Ok(hit) => Ok(hit),
            Err(CacheError::Serialization(e)) => {
                warn!(error = %e, key = %key, "Discarding unreadable cache entry");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, key = %key, "Failed to read from cache");
                Err(ServiceError::Internal)
            }
        }
    }

    async fn populate<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        self.cache.set_json(key, value, ttl).await.map_err(|e| {
            error!(error = %e, key = %key, "Failed to populate cache");
            ServiceError::Internal
        })
    }

    async fn invalidate(&self, keys: Vec<String>) -> Result<(), ServiceError> {
        self.cache.delete(&keys).await.map_err(|e| {
            error!(error = %e, keys = ?keys, "Failed to invalidate cache");
            ServiceError::Internal
        })
    }

    /// Drop both cached views of a user
    pub async fn invalidate_user(&self, user_id: &str, username: &str) -> Result<(), ServiceError> {
        self.invalidate(vec![
            keys::user_key(user_id),
            keys::user_by_username_key(username),
        ])
        .await
    }

    async fn with_links(&self, user: User) -> Result<FullUser, ServiceError> {
        let links = self.store.social_links(&user.id).await.map_err(|e| {
            error!(error = %e, user_id = %user.id, "Failed to load social links");
            ServiceError::Internal
        })?;
        Ok(FullUser::from_user(user, links))
    }

    // ============================================================================
    // Reads
    // ============================================================================

    pub async fn find_by_id(&self, id: &str) -> Result<FullUser, ServiceError> {
        let key = keys::user_key(id);
        if let Some(user) = self.cached::<FullUser>(&key).await? {
            return Ok(user);
        }

        let user = self
            .store
            .find_by_id(id)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %id, "Failed to find user by id");
                ServiceError::Internal
            })?
            .ok_or(ServiceError::UserNotFound)?;

        let full = self.with_links(user).await?;
        self.populate(&key, &full, self.config.user_cache_ttl).await?;

        Ok(full)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<FullUser, ServiceError> {
        let username = normalize_username(username);
        let key = keys::user_by_username_key(&username);
        if let Some(user) = self.cached::<FullUser>(&key).await? {
            return Ok(user);
        }

        let user = self
            .store
            .find_by_username(&username)
            .await
            .map_err(|e| {
                error!(error = %e, username = %username, "Failed to find user by username");
                ServiceError::Internal
            })?
            .ok_or(ServiceError::UserNotFound)?;

        let full = self.with_links(user).await?;
        self.populate(&key, &full, self.config.user_cache_ttl).await?;

        Ok(full)
    }

    pub async fn search_by_username(
        &self,
        query: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<RelatedUser>, ServiceError> {
        let query = query.trim().to_lowercase();
        let limit = self.config.clamp_limit(limit);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let key = keys::search_results_key(&query, limit, offset);
        if let Some(results) = self.cached::<Vec<RelatedUser>>(&key).await? {
            return Ok(results);
        }

        let results = self
            .store
            .search_by_username(&query, limit, offset)
            .await
            .map_err(|e| {
                error!(error = %e, query = %query, "Failed to search users");
                ServiceError::Internal
            })?;

        self.populate(&key, &results, self.config.search_cache_ttl)
            .await?;

        Ok(results)
    }

    pub async fn list_relations(
        &self,
        relation: Relation,
        side: RelationSide,
        user_id: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<RelatedUser>, ServiceError> {
        let limit = self.config.clamp_limit(limit);
        let key = keys::relation_list_key(relation, side, user_id, limit, offset);
        if let Some(users) = self.cached::<Vec<RelatedUser>>(&key).await? {
            return Ok(users);
        }

        let users = self
            .store
            .list_relations(relation, side, user_id, limit, offset)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, relation = ?relation, side = ?side, "Failed to list relations");
                ServiceError::Internal
            })?;

        self.populate(&key, &users, self.config.list_cache_ttl).await?;

        Ok(users)
    }

    // ============================================================================
    // Follow / Subscribe
    // ============================================================================

    pub async fn follow(&self, actor_id: &str, target_id: &str) -> Result<(), ServiceError> {
        self.add_relation(Relation::Follow, actor_id, target_id).await
    }

    pub async fn unfollow(&self, actor_id: &str, target_id: &str) -> Result<(), ServiceError> {
        self.remove_relation(Relation::Follow, actor_id, target_id)
            .await
    }

    pub async fn subscribe(&self, actor_id: &str, target_id: &str) -> Result<(), ServiceError> {
        self.add_relation(Relation::Subscribe, actor_id, target_id)
            .await
    }

    pub async fn unsubscribe(&self, actor_id: &str, target_id: &str) -> Result<(), ServiceError> {
        self.remove_relation(Relation::Subscribe, actor_id, target_id)
            .await
    }

    async fn add_relation(
        &self,
        relation: Relation,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), ServiceError> {
        if actor_id == target_id {
            return Err(match relation {
                Relation::Follow => ServiceError::CannotFollowYourself,
                Relation::Subscribe => ServiceError::CannotSubscribeToYourself,
            });
        }

        let lock = keys::action_lock_key(actor_id, relation.add_action(), target_id);
        self.acquire_action_lock(&lock).await?;

        let result = self.insert_edge(relation, actor_id, target_id).await;
        self.settle_action_lock(&lock, &result).await;
        result
    }

    async fn remove_relation(
        &self,
        relation: Relation,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), ServiceError> {
        if actor_id == target_id {
            return Err(match relation {
                Relation::Follow => ServiceError::CannotFollowYourself,
                Relation::Subscribe => ServiceError::CannotSubscribeToYourself,
            });
        }

        let lock = keys::action_lock_key(actor_id, relation.remove_action(), target_id);
        self.acquire_action_lock(&lock).await?;

        let result = self.delete_edge(relation, actor_id, target_id).await;
        self.settle_action_lock(&lock, &result).await;
        result
    }

    async fn acquire_action_lock(&self, lock: &str) -> Result<(), ServiceError> {
        let acquired = self
            .cache
            .acquire_flag(lock, self.config.action_lock_ttl)
            .await
            .map_err(|e| {
                error!(error = %e, lock = %lock, "Failed to acquire action lock");
                ServiceError::Internal
            })?;

        if acquired {
            Ok(())
        } else {
            Err(ServiceError::Cooldown)
        }
    }

    /// The lock outlives a completed attempt to throttle repeats; an attempt
    /// that died on an internal error frees it so the caller may retry.
    async fn settle_action_lock(&self, lock: &str, result: &Result<(), ServiceError>) {
        let failed_internally = matches!(result, Err(e) if e.kind() == ErrorKind::Internal);
        if failed_internally {
            if let Err(e) = self.cache.delete(&[lock.to_string()]).await {
                warn!(error = %e, lock = %lock, "Failed to release action lock");
            }
        }
    }

    async fn load_target(&self, target_id: &str) -> Result<User, ServiceError> {
        self.store
            .find_by_id(target_id)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %target_id, "Failed to load relation target");
                ServiceError::Internal
            })?
            .ok_or(ServiceError::UserNotFound)
    }

    async fn insert_edge(
        &self,
        relation: Relation,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), ServiceError> {
        let target = self.load_target(target_id).await?;

        self.store
            .add_relation(relation, target_id, actor_id)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation => match relation {
                    Relation::Follow => ServiceError::AlreadyFollowing,
                    Relation::Subscribe => ServiceError::AlreadySubscribed,
                },
                StoreError::Database(e) => {
                    error!(error = %e, actor_id = %actor_id, target_id = %target_id, relation = ?relation, "Failed to insert relation");
                    ServiceError::Internal
                }
            })?;

        self.invalidate_relation_caches(relation, actor_id, &target)
            .await?;

        info!(actor_id = %actor_id, target_id = %target_id, relation = ?relation, "Relation created");

        let published = match relation {
            Relation::Follow => self.events.follow_created(target_id, actor_id).await,
            Relation::Subscribe => self.events.subscription_created(target_id, actor_id).await,
        };
        if let Err(e) = published {
            error!(error = %e, actor_id = %actor_id, target_id = %target_id, "Failed to publish relation event");
        }

        Ok(())
    }

    async fn delete_edge(
        &self,
        relation: Relation,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), ServiceError> {
        let target = self.load_target(target_id).await?;

        let removed = self
            .store
            .remove_relation(relation, target_id, actor_id)
            .await
            .map_err(|e| {
                error!(error = %e, actor_id = %actor_id, target_id = %target_id, relation = ?relation, "Failed to remove relation");
                ServiceError::Internal
            })?;

        if removed {
            self.invalidate_relation_caches(relation, actor_id, &target)
                .await?;
            info!(actor_id = %actor_id, target_id = %target_id, relation = ?relation, "Relation removed");
        }

        Ok(())
    }

    /// The served list pages of both ends, plus the target's cached record
    /// since its counter moved.
    async fn invalidate_relation_caches(
        &self,
        relation: Relation,
        actor_id: &str,
        target: &User,
    ) -> Result<(), ServiceError> {
        let limit = self.config.max_page_size;
        let mut stale = vec![
            keys::user_key(&target.id),
            keys::user_by_username_key(&target.username),
        ];
        for page in 0..self.config.invalidated_list_pages {
            let offset = page * limit;
            stale.push(keys::relation_list_key(
                relation,
                RelationSide::Incoming,
                &target.id,
                limit,
                offset,
            ));
            stale.push(keys::relation_list_key(
                relation,
                RelationSide::Outgoing,
                actor_id,
                limit,
                offset,
            ));
        }
        self.invalidate(stale).await
    }

    // ============================================================================
    // Profile updates
    // ============================================================================

    pub async fn update(
        &self,
        user: &FullUser,
        mut patch: UserPatch,
    ) -> Result<FullUser, ServiceError> {
        if let Some(username) = patch.username.take() {
            let username = normalize_username(&username);
            if has_disallowed_characters(&username) {
                return Err(ServiceError::UsernameCannotContainSpecialCharacters);
            }
            if username != user.username {
                let taken = self
                    .store
                    .exists_with_username(&username)
                    .await
                    .map_err(internal("failed to check username availability"))?;
                if taken {
                    return Err(ServiceError::UsernameAlreadyExists);
                }
                patch.username = Some(username);
            }
        }

        if patch.is_empty() {
            return Ok(user.clone());
        }

        self.store
            .update_profile(&user.id, &patch)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation => ServiceError::UsernameAlreadyExists,
                StoreError::Database(e) => {
                    error!(error = %e, user_id = %user.id, "Failed to update user");
                    ServiceError::Internal
                }
            })?;

        let mut stale = vec![
            keys::user_key(&user.id),
            keys::user_by_username_key(&user.username),
        ];
        if let Some(new_username) = &patch.username {
            stale.push(keys::user_by_username_key(new_username));
        }
        self.invalidate(stale).await?;

        info!(user_id = %user.id, fields = ?patch.changes().keys().collect::<Vec<_>>(), "User profile updated");
        self.publish_info_updated(&user.id, &patch).await;

        self.find_by_id(&user.id).await
    }

    async fn publish_info_updated(&self, user_id: &str, patch: &UserPatch) {
        if let Err(e) = self.events.user_info_updated(user_id, patch.changes()).await {
            error!(error = %e, user_id = %user_id, "Failed to publish user info update");
        }
    }

    // ============================================================================
    // Avatar
    // ============================================================================

    pub async fn set_avatar(
        &self,
        user: &FullUser,
        file_name: &str,
        data: Bytes,
    ) -> Result<String, ServiceError> {
        if data.len() > self.config.max_avatar_bytes {
            return Err(ServiceError::FileTooLarge);
        }
        if !is_valid_image_type(&data) {
            return Err(ServiceError::FileMustBeImage);
        }
        let extension =
            image_extension(file_name).ok_or(ServiceError::FileMustHaveValidExtension)?;

        let reference = self
            .avatars
            .upload(&user.id, &extension, file_name, data)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "Failed to store avatar");
                if e.is_upstream() {
                    ServiceError::FailedToUploadAvatarToCDN
                } else {
                    ServiceError::Internal
                }
            })?;

        self.store
            .update_avatar(&user.id, Some(&reference))
            .await
            .map_err(internal("failed to persist avatar reference"))?;

        if let Some(previous) = user.avatar_url.as_deref().filter(|p| *p != reference) {
            if let Err(e) = self.avatars.remove(&user.id, previous).await {
                warn!(error = %e, user_id = %user.id, "Failed to remove previous avatar");
            }
        }

        self.invalidate_user(&user.id, &user.username).await?;

        let patch = UserPatch {
            avatar_url: Some(Some(reference.clone())),
            ..Default::default()
        };
        self.publish_info_updated(&user.id, &patch).await;

        info!(user_id = %user.id, avatar_url = %reference, "Avatar updated");
        Ok(reference)
    }

    pub async fn remove_avatar(&self, user: &FullUser) -> Result<(), ServiceError> {
        let Some(current) = user.avatar_url.as_deref() else {
            return Ok(());
        };

        self.store
            .update_avatar(&user.id, None)
            .await
            .map_err(internal("failed to clear avatar reference"))?;

        if let Err(e) = self.avatars.remove(&user.id, current).await {
            warn!(error = %e, user_id = %user.id, "Failed to remove avatar asset");
        }

        self.invalidate_user(&user.id, &user.username).await?;

        let patch = UserPatch {
            avatar_url: Some(None),
            ..Default::default()
        };
        self.publish_info_updated(&user.id, &patch).await;

        info!(user_id = %user.id, "Avatar removed");
        Ok(())
    }

    // ============================================================================
    // Social links
    // ============================================================================

    pub async fn add_social_link(&self, user: &FullUser, link: &str) -> Result<(), ServiceError> {
        let link = link.trim();

        if user.social_links.len() >= self.config.max_social_links {
            return Err(ServiceError::MaxSocialLinksAchieved);
        }

        let platform = classify_link(link).ok_or(ServiceError::LinkHasInvalidType)?;

        if user.social_links.iter().any(|l| l.platform == platform) {
            return Err(ServiceError::SocialLinkAlreadySet(platform.to_string()));
        }

        self.links.probe(link).await.map_err(|e| {
            warn!(error = %e, user_id = %user.id, link = %link, "Social link is unreachable");
            ServiceError::LinkIsUnreachable
        })?;

        self.store
            .add_social_link(&user.id, platform, link)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation => {
                    ServiceError::SocialLinkAlreadySet(platform.to_string())
                }
                StoreError::Database(e) => {
                    error!(error = %e, user_id = %user.id, "Failed to add social link");
                    ServiceError::Internal
                }
            })?;

        self.invalidate_user(&user.id, &user.username).await?;

        info!(user_id = %user.id, platform = %platform, "Social link added");
        Ok(())
    }

    pub async fn delete_social_link(
        &self,
        user: &FullUser,
        platform: &str,
    ) -> Result<(), ServiceError> {
        let platform: SocialPlatform = platform.parse()?;

        let removed = self
            .store
            .delete_social_link(&user.id, platform)
            .await
            .map_err(internal("failed to delete social link"))?;

        if removed {
            self.invalidate_user(&user.id, &user.username).await?;
            info!(user_id = %user.id, platform = %platform, "Social link deleted");
        }

        Ok(())
    }
}
