// src/users/models.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::common::ServiceError;

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Row of the `users` table. Carries the password hash, so it never leaves
/// the service layer and is never cached.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
    pub followers: i64,
    pub subscribers: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Own-profile view, also the shape kept under `user:<id>` / `user-name:<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
    pub followers: i64,
    pub subscribers: i64,
    pub created_at: String,
    pub updated_at: String,
    pub social_links: Vec<SocialLink>,
}

impl FullUser {
    pub fn from_user(user: User, social_links: Vec<SocialLink>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: user.bio,
            role: user.role,
            followers: user.followers,
            subscribers: user.subscribers,
            created_at: user.created_at,
            updated_at: user.updated_at,
            social_links,
        }
    }
}

/// What other users get to see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub followers: i64,
    pub subscribers: i64,
    pub created_at: String,
    pub updated_at: String,
    pub social_links: Vec<SocialLink>,
}

impl From<FullUser> for PublicUser {
    fn from(user: FullUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: user.bio,
            followers: user.followers,
            subscribers: user.subscribers,
            created_at: user.created_at,
            updated_at: user.updated_at,
            social_links: user.social_links,
        }
    }
}

/// Entry of a follower/subscriber listing or a search result page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RelatedUser {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// Input for a brand-new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

// ============================================================================
// Social Links
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SocialPlatform {
    Youtube,
    Tiktok,
    Github,
    Telegram,
}

impl SocialPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Youtube => "youtube",
            SocialPlatform::Tiktok => "tiktok",
            SocialPlatform::Github => "github",
            SocialPlatform::Telegram => "telegram",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialPlatform {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Ok(SocialPlatform::Youtube),
            "tiktok" => Ok(SocialPlatform::Tiktok),
            "github" => Ok(SocialPlatform::Github),
            "telegram" => Ok(SocialPlatform::Telegram),
            _ => Err(ServiceError::LinkHasInvalidType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SocialLink {
    pub platform: SocialPlatform,
    pub url: String,
}

// ============================================================================
// Relations
// ============================================================================

/// The two kinds of directed edge between users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Follow,
    Subscribe,
}

impl Relation {
    pub fn table(&self) -> &'static str {
        match self {
            Relation::Follow => "followers",
            Relation::Subscribe => "subscribers",
        }
    }

    /// Column holding the acting user; `user_id` is always the target
    pub fn actor_column(&self) -> &'static str {
        match self {
            Relation::Follow => "follower_id",
            Relation::Subscribe => "sub_id",
        }
    }

    /// Denormalized counter on the target's `users` row
    pub fn counter_column(&self) -> &'static str {
        match self {
            Relation::Follow => "followers",
            Relation::Subscribe => "subscribers",
        }
    }

    pub fn add_action(&self) -> &'static str {
        match self {
            Relation::Follow => "following",
            Relation::Subscribe => "subscribing",
        }
    }

    pub fn remove_action(&self) -> &'static str {
        match self {
            Relation::Follow => "unfollowing",
            Relation::Subscribe => "unsubscribing",
        }
    }
}

/// Which end of the edge a listing looks from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationSide {
    /// Users pointing at the subject (followers, subscribers)
    Incoming,
    /// Users the subject points at (follows, subscriptions)
    Outgoing,
}

// ============================================================================
// Profile Patch
// ============================================================================

/// Partial profile update. `None` leaves a field alone; for the nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar_url: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UserPatch {
    pub const ALLOWED_FIELDS: [&'static str; 4] = ["username", "display_name", "bio", "avatar_url"];

    /// Build a patch from a raw JSON object, rejecting every key outside the
    /// allow-list. Returns `Ok(None)` when a value has the wrong JSON type.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Option<Self>, ServiceError> {
        let mut rejected: Vec<String> = fields
            .keys()
            .filter(|k| !Self::ALLOWED_FIELDS.contains(&k.as_str()))
            .cloned()
            .collect();

        if !rejected.is_empty() {
            rejected.sort();
            return Err(ServiceError::FieldsNotAllowedToUpdate(rejected));
        }

        Ok(serde_json::from_value(Value::Object(fields)).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }

    /// The written fields as a JSON object, for the update event
    pub fn changes(&self) -> Map<String, Value> {
        let mut changes = Map::new();
        if let Some(username) = &self.username {
            changes.insert("username".to_string(), Value::from(username.clone()));
        }
        if let Some(display_name) = &self.display_name {
            changes.insert("display_name".to_string(), Value::from(display_name.clone()));
        }
        if let Some(bio) = &self.bio {
            changes.insert("bio".to_string(), Value::from(bio.clone()));
        }
        if let Some(avatar_url) = &self.avatar_url {
            changes.insert("avatar_url".to_string(), Value::from(avatar_url.clone()));
        }
        changes
    }
}

// ============================================================================
// Request / Response Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddSocialLinkRequest {
    pub link: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
