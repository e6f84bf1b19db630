//! User account models
//!
//! The `User` record is owned by the user store. The auth layer reads it as
//! the authenticated principal and only ever writes `refresh_token`,
//! `email_verified` and the password hash back through [`crate::UserRepository`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// User role enum
///
/// Defines the access level for a user in the system:
/// - Admin: Full system access including user management
/// - Moderator: Can moderate content and ban users
/// - User: Regular account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Moderator,
    User,
}

impl UserRole {
    /// Convert role to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Moderator => "moderator",
            UserRole::User => "user",
        }
    }

    /// Whether a holder of this role may run an operation that requires `required`
    ///
    /// | current   | may access             |
    /// |-----------|------------------------|
    /// | admin     | admin, moderator, user |
    /// | moderator | moderator, user        |
    /// | user      | user                   |
    pub fn allows(self, required: UserRole) -> bool {
        match self {
            UserRole::Admin => true,
            UserRole::Moderator => matches!(required, UserRole::Moderator | UserRole::User),
            UserRole::User => matches!(required, UserRole::User),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = UnknownRole;

    /// Unknown values are rejected rather than mapped to a default role
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "moderator" => Ok(UserRole::Moderator),
            "user" => Ok(UserRole::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role string is not one of the known roles
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown user role: {0}")]
pub struct UnknownRole(pub String);

/// User account model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    /// Unique public handle
    pub username: String,

    /// Unique, used as the token subject
    pub email: String,

    /// Argon2id PHC string
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub role: UserRole,

    /// The only refresh token currently honored for this user
    pub refresh_token: Option<String>,

    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Convert user to public representation (without credentials)
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar: self.avatar.clone(),
            role: self.role,
            email_verified: self.email_verified,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

/// Fields required to create an account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

impl NewUser {
    /// Materialize the stored record with store-assigned defaults
    pub fn into_user(self, id: Uuid) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            avatar: None,
            role: self.role,
            refresh_token: None,
            email_verified: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
