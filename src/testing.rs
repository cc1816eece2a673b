//! Service wiring for tests: in-memory SQLite, cache and publisher

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::auth::{AuthService, TokenIssuer};
use crate::cache::{CacheClient, MemoryCache};
use crate::common::config::{ProfileConfig, TokenConfig, WorkflowConfig};
use crate::common::migrations::run_migrations;
use crate::events::{EventBus, InMemoryPublisher};
use crate::users::avatar::LocalAvatarStore;
use crate::users::models::{NewUser, User};
use crate::users::social::{LinkProbeError, LinkProber};
use crate::users::{SqliteUserStore, UserService, UserStore};

pub const TEST_PASSWORD: &str = "longenough1";

/// Answers every probe, or fails every probe once switched off
#[derive(Default)]
pub struct StubProber {
    unreachable: AtomicBool,
}

impl StubProber {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl LinkProber for StubProber {
    async fn probe(&self, _url: &str) -> Result<(), LinkProbeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(LinkProbeError::Status(404))
        } else {
            Ok(())
        }
    }
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub store: Arc<SqliteUserStore>,
    pub cache: CacheClient,
    pub publisher: Arc<InMemoryPublisher>,
    pub prober: Arc<StubProber>,
    pub tokens: Arc<TokenIssuer>,
    pub avatar_dir: PathBuf,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool, false).await.unwrap();

        let store = Arc::new(SqliteUserStore::new(pool.clone()));
        let cache = CacheClient::new(Arc::new(MemoryCache::new()));
        let publisher = Arc::new(InMemoryPublisher::new());
        let events = EventBus::new(publisher.clone());
        let prober = Arc::new(StubProber::default());
        let avatar_dir = std::env::temp_dir().join(format!("avatars-{}", Uuid::new_v4()));
        let avatars = Arc::new(LocalAvatarStore::new(
            avatar_dir.clone(),
            "/public/avatars/".to_string(),
        ));
        let tokens = Arc::new(TokenIssuer::new(TokenConfig {
            access_secret: "test-access".to_string(),
            refresh_secret: "test-refresh".to_string(),
            ..TokenConfig::default()
        }));

        let users = Arc::new(UserService::new(
            store.clone(),
            cache.clone(),
            events.clone(),
            avatars,
            prober.clone(),
            ProfileConfig::default(),
        ));
        let auth = Arc::new(AuthService::new(
            store.clone(),
            cache.clone(),
            events,
            users.clone(),
            tokens.clone(),
            WorkflowConfig {
                bcrypt_cost: 4,
                ..WorkflowConfig::default()
            },
        ));

        Self {
            pool,
            auth,
            users,
            store,
            cache,
            publisher,
            prober,
            tokens,
            avatar_dir,
        }
    }

    /// Insert a user directly, with `TEST_PASSWORD` as password
    pub async fn create_user(&self, username: &str) -> User {
        let password_hash = hash_password(TEST_PASSWORD, 4).await.unwrap();
        self.store
            .create_user(NewUser {
                email: format!("{}@x.com", username),
                username: username.to_string(),
                password_hash,
            })
            .await
            .unwrap()
    }

    /// Make every statement touching `table` fail from now on
    pub async fn drop_table(&self, table: &str) {
        sqlx::query(&format!("DROP TABLE {}", table))
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn user_count(&self) -> usize {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .unwrap();
        count as usize
    }
}
