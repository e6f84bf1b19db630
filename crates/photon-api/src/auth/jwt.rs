//! Signed, scoped, time-bound tokens
//!
//! Every token carries `iat`, `exp` and a `scope` claim inside the signed
//! payload. One process-wide key signs all three token kinds; callers tell
//! them apart by checking `scope` after a successful decode.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use photon_core::{AuthConfig, SigningAlgorithm};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Purpose tag embedded in every token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    AccessToken,
    RefreshToken,
    EmailToken,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::AccessToken => "access_token",
            TokenScope::RefreshToken => "refresh_token",
            TokenScope::EmailToken => "email_token",
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded claims set
///
/// `sub` is optional on the wire; services reject tokens without one.
/// Any additional caller-supplied claims are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issued at timestamp (Unix epoch seconds)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: i64,
    /// Token purpose
    pub scope: TokenScope,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Seconds left until `exp`, clamped at zero
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(self.exp - now.timestamp()).unwrap_or(0)
    }
}

/// Token encoding and decoding errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(#[source] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,
}

/// Build the subject-only claim map most callers need
pub fn subject_claims(email: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("sub".to_string(), Value::String(email.to_string()));
    data
}

/// Encodes and verifies tokens with a fixed key and algorithm
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], algorithm: SigningAlgorithm) -> Self {
        let algorithm = match algorithm {
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::HS384 => Algorithm::HS384,
            SigningAlgorithm::HS512 => Algorithm::HS512,
        };

        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.secret_key.as_bytes(), config.algorithm)
    }

    /// Sign `data` with `iat`, `exp` and `scope` merged in
    ///
    /// Reserved keys in `data` are overwritten by the explicit arguments.
    pub fn encode(
        &self,
        data: &Map<String, Value>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        scope: TokenScope,
    ) -> Result<String, JwtError> {
        let mut to_encode = data.clone();
        to_encode.insert("iat".to_string(), Value::from(issued_at.timestamp()));
        to_encode.insert("exp".to_string(), Value::from(expires_at.timestamp()));
        to_encode.insert(
            "scope".to_string(),
            Value::String(scope.as_str().to_string()),
        );

        encode(&Header::new(self.algorithm), &to_encode, &self.encoding_key)
            .map_err(JwtError::EncodingError)
    }

    /// Verify signature and expiry and return the claims
    ///
    /// Expiry is checked with zero leeway: a token is dead as soon as
    /// wall-clock time passes `exp`.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        JwtError::InvalidSignature
                    }
                    _ => JwtError::Malformed,
                }
            })?;

        Ok(token_data.claims)
    }
}
