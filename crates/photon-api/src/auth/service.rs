//! Authentication service layer
//!
//! Owns the token lifecycle (mint, decode, revoke), the read-through
//! principal cache, and the login/refresh/logout, signup, email
//! confirmation and password reset flows. All collaborators are injected
//! at construction, so tests can swap in in-memory or failing doubles.

use super::jwt::{subject_claims, Claims, TokenCodec, TokenScope};
use super::models::{
    AssignableRole, ChangePasswordRequest, MessageResponse, NewPasswordForm, PrincipalSnapshot, ResetPasswordResponse,
    SignupRequest, TimeoutLink, TokenResponse,
};
use super::password::PasswordHasher;
use super::revocation::{blacklist_key, user_key, RevocationStore, StoreError};
use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;
use chrono::Utc;
use photon_core::{
    AuthConfig, CacheConfig, MailKind, Mailer, NewUser, OutboundMail, RepositoryError,
    RepositoryResult, User, UserPublic, UserRepository, UserRole,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

pub const COULD_NOT_VALIDATE: &str = "Could not validate credentials";
pub const INVALID_SCOPE: &str = "Invalid scope for token";
pub const INVALID_EMAIL_TOKEN: &str = "Invalid token for email verification";
pub const INVALID_EMAIL: &str = "Invalid email";
pub const EMAIL_NOT_CONFIRMED: &str = "Email not confirmed";
pub const INVALID_PASSWORD: &str = "Invalid password";
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";
pub const VERIFICATION_ERROR: &str = "Verification error";
pub const LINK_NOT_ACTIVE: &str = "The link is no longer active";
pub const INACTIVE_USER: &str = "Inactive user";
pub const INVALID_OLD_PASSWORD: &str = "Invalid old password";
pub const ROLE_ALREADY_SET: &str = "This user already has this role installed";

/// Lifetimes and limits the service is built with
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub email_token_ttl: Duration,
    /// How long a principal snapshot stays in the cache
    pub user_cache_ttl: Duration,
    /// Upper bound on every store and repository call
    pub io_timeout: Duration,
}

impl AuthSettings {
    pub fn from_config(auth: &AuthConfig, cache: &CacheConfig) -> Self {
        Self {
            access_token_ttl: Duration::from_secs(auth.access_token_ttl_secs),
            refresh_token_ttl: Duration::from_secs(auth.refresh_token_ttl_secs),
            email_token_ttl: Duration::from_secs(auth.email_token_ttl_secs),
            user_cache_ttl: cache.user_ttl(),
            io_timeout: cache.timeout(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default(), &CacheConfig::default())
    }
}

fn unauthorized(detail: &str) -> AppError {
    AppError::Unauthorized(detail.to_string())
}

fn mail_link(base_url: &str, path: &str, token: &str) -> String {
    format!("{}/api/auth/{path}/{token}", base_url.trim_end_matches('/'))
}

/// Authentication service
///
/// Cheap to clone: every field is either immutable configuration or a
/// shared handle to a collaborator.
#[derive(Clone)]
pub struct AuthService {
    codec: TokenCodec,
    hasher: PasswordHasher,
    store: Arc<dyn RevocationStore>,
    users: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        codec: TokenCodec,
        hasher: PasswordHasher,
        store: Arc<dyn RevocationStore>,
        users: Arc<dyn UserRepository>,
        mailer: Arc<dyn Mailer>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            codec,
            hasher,
            store,
            users,
            mailer,
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Token minting
    // ------------------------------------------------------------------

    /// Mint an access token. `ttl` defaults to the configured 15 minutes.
    pub fn create_access_token(
        &self,
        data: &Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, AppError> {
        self.mint(
            data,
            ttl.unwrap_or(self.settings.access_token_ttl),
            TokenScope::AccessToken,
        )
    }

    /// Mint a refresh token. `ttl` defaults to the configured 7 days.
    pub fn create_refresh_token(
        &self,
        data: &Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, AppError> {
        self.mint(
            data,
            ttl.unwrap_or(self.settings.refresh_token_ttl),
            TokenScope::RefreshToken,
        )
    }

    /// Mint an email token. `ttl` defaults to the configured 1 day.
    pub fn create_email_token(
        &self,
        data: &Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, AppError> {
        self.mint(
            data,
            ttl.unwrap_or(self.settings.email_token_ttl),
            TokenScope::EmailToken,
        )
    }

    fn mint(
        &self,
        data: &Map<String, Value>,
        ttl: Duration,
        scope: TokenScope,
    ) -> Result<String, AppError> {
        let issued_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| AppError::Internal(format!("Token lifetime out of range: {ttl:?}")))?;

        self.codec
            .encode(data, issued_at, expires_at, scope)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Token decoding
    // ------------------------------------------------------------------

    fn decode_scoped(&self, token: &str, scope: TokenScope) -> Result<(Claims, String), AppError> {
        let claims = self
            .codec
            .decode(token)
            .map_err(|_| unauthorized(COULD_NOT_VALIDATE))?;

        if claims.scope != scope {
            return Err(unauthorized(INVALID_SCOPE));
        }

        let email = claims
            .sub
            .clone()
            .ok_or_else(|| unauthorized(COULD_NOT_VALIDATE))?;

        Ok((claims, email))
    }

    /// Subject of a refresh token
    pub fn decode_refresh_token(&self, token: &str) -> Result<String, AppError> {
        self.decode_scoped(token, TokenScope::RefreshToken)
            .map(|(_, email)| email)
    }

    /// Subject of an email token
    ///
    /// Every failure is 422: the caller is anonymous and holds a link, not
    /// a session.
    pub fn get_email_from_token(&self, token: &str) -> Result<String, AppError> {
        self.decode_scoped(token, TokenScope::EmailToken)
            .map(|(_, email)| email)
            .map_err(|_| AppError::UnprocessableToken(INVALID_EMAIL_TOKEN.to_string()))
    }

    // ------------------------------------------------------------------
    // Principal resolution
    // ------------------------------------------------------------------

    /// Resolve a bearer access token into the current user
    ///
    /// A cache hit costs one store read after the blacklist check and
    /// never touches the repository.
    pub async fn resolve_current_user(&self, token: &str) -> Result<User, AppError> {
        let (_, email) = self
            .decode_scoped(token, TokenScope::AccessToken)
            .map_err(|_| unauthorized(COULD_NOT_VALIDATE))?;

        if self.token_is_blacklist(&email, token).await? {
            return Err(unauthorized(COULD_NOT_VALIDATE));
        }

        let key = user_key(&email);
        if let Some(bytes) = self.store_call("principal cache read", self.store.get(&key)).await? {
            match PrincipalSnapshot::from_bytes(&bytes) {
                Ok(user) => return Ok(user),
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "Discarding undecodable principal snapshot");
                }
            }
        }

        let user = self
            .repo_call("get_user_by_email", self.users.get_user_by_email(&email))
            .await?
            .ok_or_else(|| unauthorized(COULD_NOT_VALIDATE))?;

        let snapshot = PrincipalSnapshot::to_bytes(&user)
            .map_err(|e| AppError::Internal(format!("Failed to serialize principal: {e}")))?;
        self.store_call(
            "principal cache write",
            self.store.set(&key, &snapshot, self.settings.user_cache_ttl),
        )
        .await?;

        tracing::debug!(email = %email, "Principal cache populated");
        Ok(user)
    }

    /// Reject banned accounts
    pub fn require_active(&self, user: &User) -> Result<(), AppError> {
        if user.is_active {
            Ok(())
        } else {
            Err(AppError::BadRequest(INACTIVE_USER.to_string()))
        }
    }

    // ------------------------------------------------------------------
    // Blacklist
    // ------------------------------------------------------------------

    /// Whether `token` is the revoked token recorded for `email`
    pub async fn token_is_blacklist(&self, email: &str, token: &str) -> Result<bool, AppError> {
        let entry = self
            .store_call("blacklist read", self.store.get(&blacklist_key(email)))
            .await?;

        Ok(entry.as_deref() == Some(token.as_bytes()))
    }

    /// Revoke `token` until its natural expiry
    ///
    /// Only the most recent revocation per subject is kept.
    pub async fn add_token_to_blacklist(&self, token: &str) -> Result<(), AppError> {
        let claims = self
            .codec
            .decode(token)
            .map_err(|_| unauthorized(COULD_NOT_VALIDATE))?;
        let email = claims
            .sub
            .as_deref()
            .ok_or_else(|| unauthorized(COULD_NOT_VALIDATE))?;

        let remaining = claims.remaining_secs(Utc::now());
        if remaining == 0 {
            return Ok(());
        }

        self.store_call(
            "blacklist write",
            self.store.set(
                &blacklist_key(email),
                token.as_bytes(),
                Duration::from_secs(remaining),
            ),
        )
        .await
    }

    async fn evict_cached_user(&self, email: &str) -> Result<(), AppError> {
        self.store_call(
            "principal cache evict",
            self.store.set(&user_key(email), &[], Duration::ZERO),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Session flows
    // ------------------------------------------------------------------

    /// Password login. `email` is the OAuth2 form's `username` field.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AppError> {
        let Some(user) = self.find_user(email).await? else {
            return Err(self.login_failure(email, INVALID_EMAIL));
        };

        if !user.email_verified {
            return Err(self.login_failure(email, EMAIL_NOT_CONFIRMED));
        }

        if !self.verify_password(password, &user.password_hash).await? {
            return Err(self.login_failure(email, INVALID_PASSWORD));
        }

        let tokens = self.issue_token_pair(&user).await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email,
        });

        Ok(tokens)
    }

    /// Rotate the access/refresh pair
    ///
    /// A refresh token that is not the one currently stored clears the
    /// stored token, so the whole session has to log in again.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let email = self.decode_refresh_token(refresh_token)?;

        let user = self
            .find_user(&email)
            .await?
            .ok_or_else(|| unauthorized(COULD_NOT_VALIDATE))?;

        if user.refresh_token.as_deref() != Some(refresh_token) {
            self.repo_call(
                "update_refresh_token",
                self.users.update_refresh_token(user.id, None),
            )
            .await?;

            audit_log(&AuditEvent::RefreshTokenReuse {
                user_id: user.id,
                email: user.email,
            });
            return Err(unauthorized(INVALID_REFRESH_TOKEN));
        }

        let tokens = self.issue_token_pair(&user).await?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            email: user.email,
        });

        Ok(tokens)
    }

    /// Revoke the presented access token and drop the stored refresh token
    pub async fn logout(&self, user: &User, access_token: &str) -> Result<(), AppError> {
        self.add_token_to_blacklist(access_token).await?;
        self.repo_call(
            "update_refresh_token",
            self.users.update_refresh_token(user.id, None),
        )
        .await?;

        audit_log(&AuditEvent::Logout {
            user_id: user.id,
            email: user.email.clone(),
        });
        Ok(())
    }

    async fn issue_token_pair(&self, user: &User) -> Result<TokenResponse, AppError> {
        let data = subject_claims(&user.email);
        let access_token = self.create_access_token(&data, None)?;
        let refresh_token = self.create_refresh_token(&data, None)?;

        self.repo_call(
            "update_refresh_token",
            self.users.update_refresh_token(user.id, Some(&refresh_token)),
        )
        .await?;

        Ok(TokenResponse::bearer(access_token, refresh_token))
    }

    fn login_failure(&self, email: &str, reason: &str) -> AppError {
        audit_log(&AuditEvent::LoginFailure {
            email: email.to_string(),
            reason: reason.to_string(),
        });
        unauthorized(reason)
    }

    // ------------------------------------------------------------------
    // Signup and email flows
    // ------------------------------------------------------------------

    /// Register an account and mail a confirmation link
    ///
    /// The first account ever created becomes the admin.
    pub async fn signup(&self, request: SignupRequest, base_url: &str) -> Result<User, AppError> {
        request
            .validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid signup data: {e}")))?;

        let taken = self
            .repo_call(
                "exists_email_or_username",
                self.users
                    .exists_email_or_username(&request.email, &request.username),
            )
            .await?;
        if taken {
            return Err(RepositoryError::Conflict.into());
        }

        let password_hash = self.hash_password(&request.password).await?;

        let existing = self
            .repo_call("count_users", self.users.count_users())
            .await?;
        let role = if existing == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let user = self
            .repo_call(
                "create_user",
                self.users.create_user(NewUser {
                    username: request.username,
                    email: request.email,
                    password_hash,
                    first_name: request.first_name,
                    last_name: request.last_name,
                    role,
                }),
            )
            .await?;

        let token = self.create_email_token(&subject_claims(&user.email), None)?;
        self.send_mail(OutboundMail {
            kind: MailKind::ConfirmEmail,
            to: user.email.clone(),
            username: user.username.clone(),
            subject: "Confirm your email".to_string(),
            link: mail_link(base_url, "confirmed_email", &token),
        })
        .await;

        audit_log(&AuditEvent::Signup {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.to_string(),
        });

        Ok(user)
    }

    /// Mark the address behind an email token as verified
    pub async fn confirm_email(&self, token: &str) -> Result<MessageResponse, AppError> {
        let email = self.get_email_from_token(token)?;

        let user = self
            .find_user(&email)
            .await?
            .ok_or_else(|| AppError::BadRequest(VERIFICATION_ERROR.to_string()))?;

        if user.email_verified {
            return Ok(MessageResponse::new("Your email is already confirmed"));
        }

        self.repo_call("confirm_email", self.users.confirm_email(user.id))
            .await?;
        self.evict_cached_user(&user.email).await?;

        audit_log(&AuditEvent::EmailConfirmed {
            user_id: user.id,
            email: user.email,
        });

        Ok(MessageResponse::new("Email confirmed"))
    }

    /// Mail a password reset link
    pub async fn request_password_reset(
        &self,
        email: &str,
        base_url: &str,
    ) -> Result<ResetPasswordResponse, AppError> {
        let user = self
            .find_user(email)
            .await?
            .ok_or_else(|| unauthorized(INVALID_EMAIL))?;

        let token = self.create_email_token(&subject_claims(&user.email), None)?;
        self.send_mail(OutboundMail {
            kind: MailKind::ResetPassword,
            to: user.email.clone(),
            username: user.username.clone(),
            subject: "Reset your password".to_string(),
            link: mail_link(base_url, "reset_password", &token),
        })
        .await;

        audit_log(&AuditEvent::PasswordResetRequested {
            email: user.email,
        });

        Ok(ResetPasswordResponse {
            message: "Check your email for a link to reset your password".to_string(),
            timeout_link: TimeoutLink {
                seconds: self.settings.email_token_ttl.as_secs(),
            },
        })
    }

    /// Check that a reset link is still usable and return its owner
    pub async fn check_reset_link(&self, token: &str) -> Result<User, AppError> {
        let email = self.get_email_from_token(token)?;

        if self.token_is_blacklist(&email, token).await? {
            return Err(AppError::BadRequest(LINK_NOT_ACTIVE.to_string()));
        }

        let user = self
            .find_user(&email)
            .await?
            .ok_or_else(|| AppError::BadRequest(VERIFICATION_ERROR.to_string()))?;

        if !user.email_verified {
            return Err(unauthorized(EMAIL_NOT_CONFIRMED));
        }

        Ok(user)
    }

    /// Set a new password through a reset link, then burn the link
    pub async fn reset_password(&self, token: &str, form: NewPasswordForm) -> Result<(), AppError> {
        form.validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid password: {e}")))?;

        let user = self.check_reset_link(token).await?;

        let password_hash = self.hash_password(&form.password).await?;

        // Burn the link before the write: a failure after this point leaves
        // the old password and asks for a new link, never a reusable one.
        self.add_token_to_blacklist(token).await?;
        self.repo_call(
            "update_password",
            self.users.update_password(user.id, &password_hash),
        )
        .await?;
        self.evict_cached_user(&user.email).await?;

        audit_log(&AuditEvent::PasswordReset {
            user_id: user.id,
            email: user.email,
        });
        Ok(())
    }

    /// Change the signed-in user's password
    ///
    /// Ends the session it was called from: the presented access token is
    /// blacklisted and the stored refresh token cleared.
    pub async fn change_password(
        &self,
        user: &User,
        access_token: &str,
        request: ChangePasswordRequest,
    ) -> Result<UserPublic, AppError> {
        request
            .validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid password: {e}")))?;

        if !self
            .verify_password(&request.old_password, &user.password_hash)
            .await?
        {
            return Err(unauthorized(INVALID_OLD_PASSWORD));
        }

        let password_hash = self.hash_password(&request.new_password).await?;

        self.add_token_to_blacklist(access_token).await?;
        self.repo_call(
            "update_password",
            self.users.update_password(user.id, &password_hash),
        )
        .await?;
        self.repo_call(
            "update_refresh_token",
            self.users.update_refresh_token(user.id, None),
        )
        .await?;
        self.evict_cached_user(&user.email).await?;

        audit_log(&AuditEvent::PasswordChanged {
            user_id: user.id,
            email: user.email.clone(),
        });

        Ok(user.to_public())
    }

    // ------------------------------------------------------------------
    // User administration
    // ------------------------------------------------------------------

    /// Ban or unban a user
    pub async fn set_active(
        &self,
        actor: &User,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<UserPublic, AppError> {
        let user = self
            .repo_call(
                "update_is_active",
                self.users.update_is_active(user_id, is_active),
            )
            .await?;
        self.evict_cached_user(&user.email).await?;

        audit_log(&AuditEvent::ActiveChanged {
            user_id,
            is_active,
            changed_by: actor.id,
        });

        Ok(user.to_public())
    }

    /// Give a user the `user` or `moderator` role
    pub async fn change_role(
        &self,
        actor: &User,
        user_id: Uuid,
        role: AssignableRole,
    ) -> Result<UserPublic, AppError> {
        let role = UserRole::from(role);
        let target = self
            .repo_call("get_user_by_id", self.users.get_user_by_id(user_id))
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if target.role == role {
            return Err(AppError::BadRequest(ROLE_ALREADY_SET.to_string()));
        }

        let user = self
            .repo_call("update_role", self.users.update_role(user_id, role))
            .await?;
        self.evict_cached_user(&user.email).await?;

        audit_log(&AuditEvent::RoleChanged {
            user_id,
            role: role.to_string(),
            changed_by: actor.id,
        });

        Ok(user.to_public())
    }

    // ------------------------------------------------------------------
    // Collaborator plumbing
    // ------------------------------------------------------------------

    async fn find_user(&self, email: &str) -> Result<Option<User>, AppError> {
        self.repo_call("get_user_by_email", self.users.get_user_by_email(email))
            .await
    }

    async fn send_mail(&self, mail: OutboundMail) {
        let to = mail.to.clone();
        let kind = mail.kind;
        match tokio::time::timeout(self.settings.io_timeout, self.mailer.send(mail)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(to = %to, kind = ?kind, error = %e, "Mail not sent"),
            Err(_) => tracing::warn!(to = %to, kind = ?kind, "Mail delivery timed out"),
        }
    }

    async fn hash_password(&self, plaintext: &str) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();

        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify_password(&self, plaintext: &str, digest: &str) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();

        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))
    }

    async fn store_call<T, F>(&self, operation: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.io_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.unavailable(operation, e.to_string())),
            Err(_) => Err(self.unavailable(
                operation,
                format!("timed out after {:?}", self.settings.io_timeout),
            )),
        }
    }

    async fn repo_call<T, F>(&self, operation: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        match tokio::time::timeout(self.settings.io_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(RepositoryError::Unavailable(reason))) => {
                Err(self.unavailable(operation, reason))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(self.unavailable(
                operation,
                format!("timed out after {:?}", self.settings.io_timeout),
            )),
        }
    }

    fn unavailable(&self, operation: &str, reason: String) -> AppError {
        tracing::error!(operation, reason = %reason, "Backing store unavailable");
        audit_log(&AuditEvent::StoreUnavailable {
            operation: operation.to_string(),
            reason: reason.clone(),
        });
        AppError::StoreUnavailable(reason)
    }
}
