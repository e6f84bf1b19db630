//! Authentication and authorization module
//!
//! - `jwt`: scoped token encoding and decoding
//! - `password`: Argon2id hashing
//! - `revocation`: blacklist and principal cache store
//! - `service`: token lifecycle and session flows
//! - `policy` / `middleware`: role gate and request authentication
//! - `repository`: Postgres and in-memory user stores

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod revocation;
pub mod service;

pub use jwt::{subject_claims, Claims, JwtError, TokenCodec, TokenScope};
pub use middleware::{auth_middleware, bearer_token, require_role, AuthenticatedUser};
pub use models::{
    AssignableRole, ChangePasswordRequest, ChangeRoleRequest, EmailRequest, LoginForm, MessageResponse, NewPasswordForm,
    PrincipalSnapshot, ResetPasswordResponse, SetActiveRequest, SignupRequest, SignupResponse,
    StatusResponse, TimeoutLink, TokenResponse,
};
pub use password::{PasswordConfig, PasswordError, PasswordHasher};
pub use policy::AccessPolicy;
pub use repository::{InMemoryUserRepository, PgUserRepository};
pub use revocation::{
    blacklist_key, user_key, InMemoryRevocationStore, RedisRevocationStore, RevocationStore,
    StoreError,
};
pub use service::{AuthService, AuthSettings};
