//! Request/response shapes for the auth endpoints and the cached principal format

use photon_core::{User, UserPublic, UserRole};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(
        length(min = 3, max = 20),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 100))]
    pub first_name: String,
    #[validate(length(min = 3, max = 100))]
    pub last_name: String,
    #[validate(length(min = 6, max = 20))]
    pub password: String,
}

fn validate_username(username: &str) -> Result<(), validator::ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(validator::ValidationError::new("username_charset"))
    }
}

/// Registration response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignupResponse {
    pub user: UserPublic,
    pub detail: String,
}

/// Login form (OAuth2 password flow: `username` carries the email)
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Access/refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Password reset request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

/// Lifetime of a mailed link
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TimeoutLink {
    pub seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordResponse {
    pub message: String,
    pub timeout_link: TimeoutLink,
}

/// New password submitted from the reset form
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewPasswordForm {
    #[validate(length(min = 6, max = 20))]
    pub password: String,
}

/// Password change for the signed-in user
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 6, max = 20))]
    pub old_password: String,
    #[validate(length(min = 6, max = 20))]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

/// Roles an admin may hand out. Admin itself is never assignable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssignableRole {
    User,
    Moderator,
}

impl From<AssignableRole> for UserRole {
    fn from(role: AssignableRole) -> Self {
        match role {
            AssignableRole::User => UserRole::User,
            AssignableRole::Moderator => UserRole::Moderator,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    pub role: AssignableRole,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Cached principal, tagged with a format version
///
/// Readers that meet an unknown version treat the entry as a cache miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "v")]
pub enum PrincipalSnapshot {
    #[serde(rename = "1")]
    V1(User),
}

impl PrincipalSnapshot {
    pub fn to_bytes(user: &User) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&PrincipalSnapshot::V1(user.clone()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<User, serde_json::Error> {
        match serde_json::from_slice(bytes)? {
            PrincipalSnapshot::V1(user) => Ok(user),
        }
    }
}
