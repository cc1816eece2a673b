// src/users/repository.rs
//! Durable storage of users, social links and follow/subscribe edges

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::models::{
    NewUser, Relation, RelationSide, RelatedUser, SocialLink, SocialPlatform, User, UserPatch,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let unique = e.as_database_error().map_or(false, |d| {
            d.is_unique_violation() || d.message().contains("UNIQUE constraint failed")
        });
        if unique {
            StoreError::UniqueViolation
        } else {
            StoreError::Database(e)
        }
    }
}

/// Everything the account and profile components need from the database
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email_or_username(&self, login: &str) -> Result<Option<User>, StoreError>;
    async fn exists_with_email(&self, email: &str) -> Result<bool, StoreError>;
    async fn exists_with_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn update_profile(&self, id: &str, patch: &UserPatch) -> Result<(), StoreError>;
    async fn update_avatar(&self, id: &str, avatar_url: Option<&str>) -> Result<(), StoreError>;
    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), StoreError>;

    async fn search_by_username(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RelatedUser>, StoreError>;

    /// Insert the edge and bump the target's counter in one transaction
    async fn add_relation(
        &self,
        relation: Relation,
        target_id: &str,
        actor_id: &str,
    ) -> Result<(), StoreError>;

    /// Delete the edge and decrement the counter. `false` if there was no edge.
    async fn remove_relation(
        &self,
        relation: Relation,
        target_id: &str,
        actor_id: &str,
    ) -> Result<bool, StoreError>;

    async fn list_relations(
        &self,
        relation: Relation,
        side: RelationSide,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RelatedUser>, StoreError>;

    async fn social_links(&self, user_id: &str) -> Result<Vec<SocialLink>, StoreError>;
    async fn add_social_link(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        url: &str,
    ) -> Result<(), StoreError>;
    async fn delete_social_link(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<bool, StoreError>;
}

const USER_COLUMNS: &str = "id, email, username, password_hash, display_name, avatar_url, bio, \
                            role, followers, subscribers, created_at, updated_at";

pub struct SqliteUserStore {
    db: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn touch(&self, id: &str, column: &str, value: Option<&str>) -> Result<(), StoreError> {
        let query = format!("UPDATE users SET {} = ?, updated_at = ? WHERE id = ?", column);
        sqlx::query(&query)
            .bind(value)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Escape LIKE wildcards so the query matches literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'user', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        info!(user_id = %id, username = %new_user.username, "Created user");

        self.find_one("id", &id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.find_one("id", id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_email_or_username(&self, login: &str) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {} FROM users WHERE email = ? OR username = ? LIMIT 1",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(login)
            .bind(login.to_lowercase())
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn exists_with_email(&self, email: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn exists_with_username(&self, username: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn update_profile(&self, id: &str, patch: &UserPatch) -> Result<(), StoreError> {
        // Build dynamic update query
        let mut updates = Vec::new();
        let mut params: Vec<Option<String>> = Vec::new();

        if let Some(username) = &patch.username {
            updates.push("username = ?");
            params.push(Some(username.clone()));
        }
        if let Some(display_name) = &patch.display_name {
            updates.push("display_name = ?");
            params.push(display_name.clone());
        }
        if let Some(bio) = &patch.bio {
            updates.push("bio = ?");
            params.push(bio.clone());
        }
        if let Some(avatar_url) = &patch.avatar_url {
            updates.push("avatar_url = ?");
            params.push(avatar_url.clone());
        }

        if updates.is_empty() {
            return Ok(());
        }

        updates.push("updated_at = ?");
        params.push(Some(chrono::Utc::now().to_rfc3339()));
        params.push(Some(id.to_string()));

        let query = format!("UPDATE users SET {} WHERE id = ?", updates.join(", "));

        let mut query_builder = sqlx::query(&query);
        for param in params {
            query_builder = query_builder.bind(param);
        }
        query_builder.execute(&self.db).await?;

        Ok(())
    }

    async fn update_avatar(&self, id: &str, avatar_url: Option<&str>) -> Result<(), StoreError> {
        self.touch(id, "avatar_url", avatar_url).await
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), StoreError> {
        self.touch(id, "password_hash", Some(password_hash)).await
    }

    async fn search_by_username(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RelatedUser>, StoreError> {
        let users = sqlx::query_as::<_, RelatedUser>(
            r#"
            SELECT id, username, display_name, avatar_url, bio
            FROM users
            WHERE username LIKE ? ESCAPE '\'
            ORDER BY followers DESC, username ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(like_pattern(&query.to_lowercase()))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn add_relation(
        &self,
        relation: Relation,
        target_id: &str,
        actor_id: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        let insert = format!(
            "INSERT INTO {} (user_id, {}, created_at) VALUES (?, ?, ?)",
            relation.table(),
            relation.actor_column()
        );
        sqlx::query(&insert)
            .bind(target_id)
            .bind(actor_id)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let bump = format!(
            "UPDATE users SET {0} = {0} + 1 WHERE id = ?",
            relation.counter_column()
        );
        sqlx::query(&bump).bind(target_id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_relation(
        &self,
        relation: Relation,
        target_id: &str,
        actor_id: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await?;

        let delete = format!(
            "DELETE FROM {} WHERE user_id = ? AND {} = ?",
            relation.table(),
            relation.actor_column()
        );
        let result = sqlx::query(&delete)
            .bind(target_id)
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let drop_count = format!(
            "UPDATE users SET {0} = MAX({0} - 1, 0) WHERE id = ?",
            relation.counter_column()
        );
        sqlx::query(&drop_count)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_relations(
        &self,
        relation: Relation,
        side: RelationSide,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RelatedUser>, StoreError> {
        // Incoming: users whose id sits in the actor column of edges pointing at us.
        let (join_column, filter_column) = match side {
            RelationSide::Incoming => (relation.actor_column(), "user_id"),
            RelationSide::Outgoing => ("user_id", relation.actor_column()),
        };

        let query = format!(
            r#"
            SELECT u.id, u.username, u.display_name, u.avatar_url, u.bio
            FROM {table} r
            JOIN users u ON u.id = r.{join_column}
            WHERE r.{filter_column} = ?
            ORDER BY r.created_at DESC
            LIMIT ? OFFSET ?
            "#,
            table = relation.table(),
            join_column = join_column,
            filter_column = filter_column,
        );

        let users = sqlx::query_as::<_, RelatedUser>(&query)
            .bind(user_id)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.db)
            .await?;
        Ok(users)
    }

    async fn social_links(&self, user_id: &str) -> Result<Vec<SocialLink>, StoreError> {
        let links = sqlx::query_as::<_, SocialLink>(
            "SELECT platform, url FROM social_links WHERE user_id = ? ORDER BY platform",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(links)
    }

    async fn add_social_link(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        url: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO social_links (user_id, platform, url) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(platform)
            .bind(url)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_social_link(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM social_links WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteUserStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool, false).await.unwrap();
        SqliteUserStore::new(pool)
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            email: format!("{}@x.com", name),
            username: name.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let store = store().await;
        store.create_user(new_user("bob")).await.unwrap();

        let mut again = new_user("bob");
        again.email = "other@x.com".to_string();
        let err = store.create_user(again).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));
    }

    #[tokio::test]
    async fn test_relation_edge_and_counter_move_together() {
        let store = store().await;
        let alice = store.create_user(new_user("alice")).await.unwrap();
        let bob = store.create_user(new_user("bob")).await.unwrap();

        store
            .add_relation(Relation::Follow, &bob.id, &alice.id)
            .await
            .unwrap();
        let err = store
            .add_relation(Relation::Follow, &bob.id, &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));

        let bob_now = store.find_by_id(&bob.id).await.unwrap().unwrap();
        assert_eq!(bob_now.followers, 1);
        assert_eq!(bob_now.subscribers, 0);

        let followers = store
            .list_relations(Relation::Follow, RelationSide::Incoming, &bob.id, 10, 0)
            .await
            .unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id, alice.id);

        let follows = store
            .list_relations(Relation::Follow, RelationSide::Outgoing, &alice.id, 10, 0)
            .await
            .unwrap();
        assert_eq!(follows[0].id, bob.id);

        assert!(store
            .remove_relation(Relation::Follow, &bob.id, &alice.id)
            .await
            .unwrap());
        assert!(!store
            .remove_relation(Relation::Follow, &bob.id, &alice.id)
            .await
            .unwrap());

        let bob_now = store.find_by_id(&bob.id).await.unwrap().unwrap();
        assert_eq!(bob_now.followers, 0);
    }

    #[tokio::test]
    async fn test_self_edge_is_rejected_by_schema() {
        let store = store().await;
        let alice = store.create_user(new_user("alice")).await.unwrap();

        let result = store
            .add_relation(Relation::Subscribe, &alice.id, &alice.id)
            .await;
        assert!(result.is_err());

        let alice_now = store.find_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(alice_now.subscribers, 0);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = store().await;
        store.create_user(new_user("bob")).await.unwrap();
        store.create_user(new_user("bobby")).await.unwrap();
        store.create_user(new_user("rob_1")).await.unwrap();

        let found = store.search_by_username("BOB", 10, 0).await.unwrap();
        assert_eq!(found.len(), 2);

        let found = store.search_by_username("%", 10, 0).await.unwrap();
        assert!(found.is_empty());

        let found = store.search_by_username("o_", 10, 0).await.unwrap();
        assert!(found.is_empty());

        let found = store.search_by_username("b_", 10, 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "rob_1");
    }

    #[tokio::test]
    async fn test_update_profile_clears_nullable_fields() {
        let store = store().await;
        let bob = store.create_user(new_user("bob")).await.unwrap();

        let patch = UserPatch {
            bio: Some(Some("hello".to_string())),
            ..Default::default()
        };
        store.update_profile(&bob.id, &patch).await.unwrap();
        assert_eq!(
            store.find_by_id(&bob.id).await.unwrap().unwrap().bio.as_deref(),
            Some("hello")
        );

        let patch = UserPatch {
            bio: Some(None),
            ..Default::default()
        };
        store.update_profile(&bob.id, &patch).await.unwrap();
        assert!(store.find_by_id(&bob.id).await.unwrap().unwrap().bio.is_none());
    }

    #[tokio::test]
    async fn test_social_link_primary_key() {
        let store = store().await;
        let bob = store.create_user(new_user("bob")).await.unwrap();

        store
            .add_social_link(&bob.id, SocialPlatform::Github, "https://github.com/bob")
            .await
            .unwrap();
        let err = store
            .add_social_link(&bob.id, SocialPlatform::Github, "https://github.com/bob2")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));

        let links = store.social_links(&bob.id).await.unwrap();
        assert_eq!(links.len(), 1);

        assert!(store
            .delete_social_link(&bob.id, SocialPlatform::Github)
            .await
            .unwrap());
        assert!(store.social_links(&bob.id).await.unwrap().is_empty());
    }
}
