// src/common/config.rs
//! Service configuration
//!
//! Everything is read once at startup and handed to the components that need
//! it, so no business logic touches the process environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// JWT signing secrets and expiries
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: "replace_with_strong_access_secret".to_string(),
            refresh_secret: "replace_with_strong_refresh_secret".to_string(),
            access_ttl: Duration::from_secs(3 * 60 * 60),
            refresh_ttl: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

impl TokenConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = env::var("ACCESS_SECRET") {
            config.access_secret = secret;
        }
        if let Ok(secret) = env::var("REFRESH_SECRET") {
            config.refresh_secret = secret;
        }
        if let Some(secs) = parse_env::<u64>("ACCESS_TOKEN_TTL_SECONDS") {
            config.access_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("REFRESH_TOKEN_TTL_SECONDS") {
            config.refresh_ttl = Duration::from_secs(secs);
        }

        config
    }
}

/// Settings of the registration / sign-in / password-reset workflow
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub bcrypt_cost: u32,
    pub registration_code_ttl: Duration,
    pub registration_marker_ttl: Duration,
    pub sign_in_code_ttl: Duration,
    pub forgot_password_code_ttl: Duration,
    pub code_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: 10,
            registration_code_ttl: Duration::from_secs(5 * 60),
            registration_marker_ttl: Duration::from_secs(60 * 60),
            sign_in_code_ttl: Duration::from_secs(15 * 60),
            forgot_password_code_ttl: Duration::from_secs(5 * 60),
            code_attempts: 10,
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(cost) = parse_env::<u32>("BCRYPT_COST") {
            config.bcrypt_cost = cost;
        }
        if let Some(secs) = parse_env::<u64>("REGISTRATION_CODE_TTL_SECONDS") {
            config.registration_code_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("REGISTRATION_MARKER_TTL_SECONDS") {
            config.registration_marker_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("SIGN_IN_CODE_TTL_SECONDS") {
            config.sign_in_code_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("FORGOT_PASSWORD_CODE_TTL_SECONDS") {
            config.forgot_password_code_ttl = Duration::from_secs(secs);
        }

        config
    }
}

/// Settings of the profile & relationship component
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub user_cache_ttl: Duration,
    pub search_cache_ttl: Duration,
    pub list_cache_ttl: Duration,
    pub action_lock_ttl: Duration,
    pub max_page_size: u32,
    /// Pages (at `max_page_size`) whose cached relation lists are dropped on
    /// every follow/subscribe change; deeper pages age out via `list_cache_ttl`.
    pub invalidated_list_pages: u32,
    pub max_social_links: usize,
    pub max_avatar_bytes: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            user_cache_ttl: Duration::from_secs(3 * 60 * 60),
            search_cache_ttl: Duration::from_secs(5 * 60),
            list_cache_ttl: Duration::from_secs(60),
            action_lock_ttl: Duration::from_secs(5 * 60),
            max_page_size: 10,
            invalidated_list_pages: 3,
            max_social_links: 4,
            max_avatar_bytes: 5 * 1024 * 1024,
        }
    }
}

impl ProfileConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = parse_env::<u64>("USER_CACHE_TTL_SECONDS") {
            config.user_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("ACTION_LOCK_TTL_SECONDS") {
            config.action_lock_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = parse_env::<u32>("MAX_PAGE_SIZE") {
            config.max_page_size = size.max(1);
        }

        config
    }

    /// Clamp a requested page size into `1..=max_page_size`
    pub fn clamp_limit(&self, limit: Option<u32>) -> u32 {
        match limit {
            Some(l) if l > 0 => l.min(self.max_page_size),
            _ => self.max_page_size,
        }
    }
}

/// Where uploaded avatars end up
#[derive(Debug, Clone)]
pub enum AvatarStorage {
    Local { dir: PathBuf, public_prefix: String },
    Cdn { origin: String },
}

impl AvatarStorage {
    pub fn from_env() -> Self {
        match env::var("AVATAR_STORAGE").as_deref() {
            Ok("cdn") => AvatarStorage::Cdn {
                origin: env::var("CDN_ORIGIN")
                    .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            },
            _ => AvatarStorage::Local {
                dir: PathBuf::from(
                    env::var("AVATARS_DIR").unwrap_or_else(|_| "./public/avatars".to_string()),
                ),
                public_prefix: "/public/avatars/".to_string(),
            },
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub reset_db: bool,
    pub redis_url: Option<String>,
    pub rabbitmq_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    pub outbound_timeout: Duration,
    pub tokens: TokenConfig,
    pub workflow: WorkflowConfig,
    pub profile: ProfileConfig,
    pub avatars: AvatarStorage,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            port: parse_env("PORT").unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://user_service.db".to_string()),
            reset_db: env::var("RESET_DB").map(|v| v == "true").unwrap_or(false),
            redis_url: non_empty_env("REDIS_URL"),
            rabbitmq_url: non_empty_env("RABBITMQ_URL"),
            cors_origins,
            request_timeout: Duration::from_secs(
                parse_env("REQUEST_TIMEOUT_SECONDS").unwrap_or(15),
            ),
            outbound_timeout: Duration::from_secs(
                parse_env("OUTBOUND_TIMEOUT_SECONDS").unwrap_or(5),
            ),
            tokens: TokenConfig::from_env(),
            workflow: WorkflowConfig::from_env(),
            profile: ProfileConfig::from_env(),
            avatars: AvatarStorage::from_env(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        let config = ProfileConfig::default();

        assert_eq!(config.clamp_limit(Some(5)), 5);
        assert_eq!(config.clamp_limit(Some(500)), 10);
        assert_eq!(config.clamp_limit(Some(0)), 10);
        assert_eq!(config.clamp_limit(None), 10);
    }

    #[test]
    fn test_token_defaults_have_independent_expiries() {
        let config = TokenConfig::default();
        assert!(config.refresh_ttl > config.access_ttl);
        assert_ne!(config.access_secret, config.refresh_secret);
    }
}
