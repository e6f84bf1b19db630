//! User store collaborator
//!
//! The auth layer never talks to a database directly. It is handed a
//! [`UserRepository`] and performs single-record reads and writes through it.

use crate::user::{NewUser, User, UserRole};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("User not found")]
    NotFound,

    #[error("Email or username already exists")]
    Conflict,

    #[error("Stored role is not recognized: {0}")]
    InvalidRole(String),

    #[error("User store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Persistence operations the auth layer needs from the user store
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by email
    async fn get_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    /// Find a user by id
    async fn get_user_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>>;

    /// Whether any account already uses this email or username
    async fn exists_email_or_username(&self, email: &str, username: &str)
        -> RepositoryResult<bool>;

    /// Number of accounts
    async fn count_users(&self) -> RepositoryResult<u64>;

    /// Create a user and return the stored record
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User>;

    /// Overwrite (or clear) the single stored refresh token
    async fn update_refresh_token(&self, id: Uuid, token: Option<&str>) -> RepositoryResult<()>;

    /// Mark the email address as verified
    async fn confirm_email(&self, id: Uuid) -> RepositoryResult<()>;

    /// Replace the password hash
    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<()>;

    /// Change the user's role
    async fn update_role(&self, id: Uuid, role: UserRole) -> RepositoryResult<User>;

    /// Ban or unban the user
    async fn update_is_active(&self, id: Uuid, is_active: bool) -> RepositoryResult<User>;
}
