//! User store implementations
//!
//! - [`PgUserRepository`]: PostgreSQL via SQLx, used in production
//! - [`InMemoryUserRepository`]: process-local map, used by tests and
//!   when no `DATABASE_URL` is configured

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use photon_core::{NewUser, RepositoryError, RepositoryResult, User, UserRepository, UserRole};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, avatar, \
     role, refresh_token, email_verified, is_active, created_at, updated_at";

/// PostgreSQL user store
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Open a connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> RepositoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                RepositoryError::Unavailable(format!("PostgreSQL connection failed: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Migration failed: {e}")))
    }

    async fn fetch_one_user(&self, sql: &str, id: Uuid) -> RepositoryResult<User> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    avatar: Option<String>,
    role: String,
    refresh_token: Option<String>,
    email_verified: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<UserRole>()
            .map_err(|e| RepositoryError::InvalidRole(e.0))?;

        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar: row.avatar,
            role,
            refresh_token: row.refresh_token,
            email_verified: row.email_verified,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Connection-level failures are retryable; everything else is a query error
fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => RepositoryError::Unavailable(err.to_string()),
        _ => RepositoryError::Database(err.to_string()),
    }
}

fn expect_row(rows_affected: u64) -> RepositoryResult<()> {
    if rows_affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn get_user_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        match self.fetch_one_user(&sql, id).await {
            Ok(user) => Ok(Some(user)),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn exists_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> RepositoryResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_users(&self) -> RepositoryResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, password_hash, first_name, last_name, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .try_into()
    }

    async fn update_refresh_token(&self, id: Uuid, token: Option<&str>) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(token)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        expect_row(result.rows_affected())
    }

    async fn confirm_email(&self, id: Uuid) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        expect_row(result.rows_affected())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        expect_row(result.rows_affected())
    }

    async fn update_role(&self, id: Uuid, role: UserRole) -> RepositoryResult<User> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    async fn update_is_active(&self, id: Uuid, is_active: bool) -> RepositoryResult<User> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }
}

// ============================================================================
// In-process
// ============================================================================

/// User store backed by a map keyed on user id
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the record with this email, if any
    pub async fn remove(&self, email: &str) -> Option<User> {
        let mut users = self.users.write().await;
        let id = users.values().find(|u| u.email == email).map(|u| u.id)?;
        users.remove(&id)
    }

    async fn modify<F>(&self, id: Uuid, change: F) -> RepositoryResult<User>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        change(user);
        user.updated_at = Some(Utc::now());
        Ok(user.clone())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn exists_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> RepositoryResult<bool> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .any(|u| u.email == email || u.username == username))
    }

    async fn count_users(&self) -> RepositoryResult<u64> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(RepositoryError::Conflict);
        }

        let user = user.into_user(Uuid::new_v4());
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_refresh_token(&self, id: Uuid, token: Option<&str>) -> RepositoryResult<()> {
        let token = token.map(str::to_owned);
        self.modify(id, move |u| u.refresh_token = token).await?;
        Ok(())
    }

    async fn confirm_email(&self, id: Uuid) -> RepositoryResult<()> {
        self.modify(id, |u| u.email_verified = true).await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<()> {
        let password_hash = password_hash.to_owned();
        self.modify(id, move |u| u.password_hash = password_hash)
            .await?;
        Ok(())
    }

    async fn update_role(&self, id: Uuid, role: UserRole) -> RepositoryResult<User> {
        self.modify(id, |u| u.role = role).await
    }

    async fn update_is_active(&self, id: Uuid, is_active: bool) -> RepositoryResult<User> {
        self.modify(id, |u| u.is_active = is_active).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn test_in_memory_create_and_lookup() {
        let repo = InMemoryUserRepository::new();
        let created = repo
            .create_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(!created.email_verified);
        assert!(created.is_active);
        assert_eq!(repo.count_users().await.unwrap(), 1);

        let found = repo
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(repo.get_user_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_rejects_duplicates() {
        let repo = InMemoryUserRepository::new();
        repo.create_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(repo
            .exists_email_or_username("other@example.com", "alice")
            .await
            .unwrap());
        let result = repo.create_user(new_user("alice2", "alice@example.com")).await;
        assert!(matches!(result, Err(RepositoryError::Conflict)));
    }

    #[tokio::test]
    async fn test_in_memory_updates() {
        let repo = InMemoryUserRepository::new();
        let user = repo
            .create_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        repo.update_refresh_token(user.id, Some("rt-1")).await.unwrap();
        repo.confirm_email(user.id).await.unwrap();
        let updated = repo.update_role(user.id, UserRole::Moderator).await.unwrap();

        assert_eq!(updated.refresh_token.as_deref(), Some("rt-1"));
        assert!(updated.email_verified);
        assert_eq!(updated.role, UserRole::Moderator);
        assert!(updated.updated_at.is_some());

        repo.update_refresh_token(user.id, None).await.unwrap();
        let cleared = repo.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(cleared.refresh_token, None);
    }

    #[tokio::test]
    async fn test_in_memory_unknown_id() {
        let repo = InMemoryUserRepository::new();
        let result = repo.update_is_active(Uuid::new_v4(), false).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn test_postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let repo = PgUserRepository::connect(&url, 2).await.unwrap();
        repo.migrate().await.unwrap();

        let suffix = Uuid::new_v4().simple().to_string();
        let email = format!("pg-{suffix}@example.com");
        let created = repo
            .create_user(new_user(&suffix[..16], &email))
            .await
            .unwrap();

        let found = repo.get_user_by_email(&email).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, UserRole::User);

        let dup = repo.create_user(new_user(&suffix[..16], &email)).await;
        assert!(matches!(dup, Err(RepositoryError::Conflict)));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn test_postgres_stores_long_refresh_token() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let repo = PgUserRepository::connect(&url, 2).await.unwrap();
        repo.migrate().await.unwrap();

        let suffix = Uuid::new_v4().simple().to_string();
        let email = format!("{}-{suffix}@example.com", "x".repeat(200));
        let user = repo
            .create_user(new_user(&suffix[..16], &email))
            .await
            .unwrap();

        // HS512 tokens for long addresses run well past 512 characters
        let token = "t".repeat(2048);
        repo.update_refresh_token(user.id, Some(&token)).await.unwrap();

        let found = repo.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.refresh_token.as_deref(), Some(token.as_str()));
    }
}
