//! Photon Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development. Configuration is loaded once at
//! process start and handed to the services that need it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database connections
    pub database: DatabaseConfig,

    /// Token signing and lifetimes
    pub auth: AuthConfig,

    /// Revocation store / user cache
    pub cache: CacheConfig,

    /// Outbound mail
    pub mail: MailConfig,

    /// Per-IP request limits on the credential endpoints
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            self.server.public_base_url = url;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.postgres_url = Some(url);
        }
        if let Some(size) = parse_env("DATABASE_POOL_SIZE")? {
            self.database.postgres_pool_size = size;
        }

        // Tokens
        if let Ok(secret) = std::env::var("SECRET_KEY_JWT") {
            self.auth.secret_key = secret;
        }
        if let Ok(algorithm) = std::env::var("JWT_ALGORITHM") {
            self.auth.algorithm = algorithm.parse()?;
        }
        if let Some(ttl) = parse_env("ACCESS_TOKEN_TTL_SECS")? {
            self.auth.access_token_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_env("REFRESH_TOKEN_TTL_SECS")? {
            self.auth.refresh_token_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_env("EMAIL_TOKEN_TTL_SECS")? {
            self.auth.email_token_ttl_secs = ttl;
        }

        // Redis / user cache
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
        if let Some(ttl) = parse_env("USER_CACHE_TTL_SECS")? {
            self.cache.user_ttl_secs = ttl;
        }
        if let Some(timeout) = parse_env("STORE_TIMEOUT_MS")? {
            self.cache.timeout_ms = timeout;
        }

        // Mail
        if let Ok(from) = std::env::var("MAIL_FROM") {
            self.mail.from = from;
        }
        if let Ok(name) = std::env::var("MAIL_FROM_NAME") {
            self.mail.from_name = name;
        }

        // Rate limiting
        if let Some(enabled) = parse_env("RATE_LIMIT_ENABLED")? {
            self.rate_limit.enabled = enabled;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Externally visible base URL, used for links in outgoing mail
    pub public_base_url: String,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080/".to_string(),
            // Empty means same-origin only - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without one the server keeps users in memory.
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub postgres_pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            postgres_pool_size: 10,
        }
    }
}

/// HMAC algorithm used to sign tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SigningAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            _ => Err(ConfigError::InvalidValue {
                key: "JWT_ALGORITHM".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Process-wide signing secret
    pub secret_key: String,

    /// Signing algorithm
    pub algorithm: SigningAlgorithm,

    /// Default access token lifetime (15 minutes)
    pub access_token_ttl_secs: u64,

    /// Default refresh token lifetime (7 days)
    pub refresh_token_ttl_secs: u64,

    /// Default email-verification / reset token lifetime (1 day)
    pub email_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: "development-secret-key-change-in-production".to_string(),
            algorithm: SigningAlgorithm::HS256,
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            email_token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl AuthConfig {
    /// Reject configurations that cannot sign tokens safely
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired("SECRET_KEY_JWT".to_string()));
        }
        Ok(())
    }
}

/// Revocation store and user cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis URL. Without one an in-process store is used.
    pub redis_url: Option<String>,

    /// Lifetime of a cached principal snapshot
    pub user_ttl_secs: u64,

    /// Upper bound for a single store or repository call
    pub timeout_ms: u64,

    /// Capacity of the in-process store
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            user_ttl_secs: 15 * 60,
            timeout_ms: 2_000,
            max_capacity: 100_000,
        }
    }
}

impl CacheConfig {
    pub fn user_ttl(&self) -> Duration {
        Duration::from_secs(self.user_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Outbound mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Sender address
    pub from: String,

    /// Display name of the sender
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "no-reply@photon.local".to_string(),
            from_name: "Photon".to_string(),
        }
    }
}

/// Request limits, one token bucket per client IP
///
/// A bucket holds `*_burst` requests and regains one every `*_period_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// `POST /auth/login`
    pub login_period_ms: u64,
    pub login_burst: u32,

    /// Both password reset endpoints
    pub reset_period_ms: u64,
    pub reset_burst: u32,

    /// `PATCH /users/password`
    pub password_change_period_ms: u64,
    pub password_change_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login_period_ms: 1_000,
            login_burst: 5,
            // 10 per 5 minutes
            reset_period_ms: 30_000,
            reset_burst: 10,
            // 2 per minute
            password_change_period_ms: 30_000,
            password_change_burst: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.access_token_ttl_secs, 900);
        assert_eq!(config.auth.refresh_token_ttl_secs, 604_800);
        assert_eq!(config.auth.email_token_ttl_secs, 86_400);
        assert_eq!(config.cache.user_ttl(), Duration::from_secs(900));
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.reset_burst, 10);
    }

    #[test]
    fn test_rate_limit_section_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [rate_limit]
            enabled = false
            login_burst = 20
            "#,
        )
        .unwrap();

        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.login_burst, 20);
        assert_eq!(config.rate_limit.login_period_ms, 1_000);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(
            "hs256".parse::<SigningAlgorithm>().unwrap(),
            SigningAlgorithm::HS256
        );
        assert_eq!(
            "HS512".parse::<SigningAlgorithm>().unwrap(),
            SigningAlgorithm::HS512
        );
        assert!("RS256".parse::<SigningAlgorithm>().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [auth]
            secret_key = "s3cret"
            algorithm = "HS384"

            [cache]
            user_ttl_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.secret_key, "s3cret");
        assert_eq!(config.auth.algorithm, SigningAlgorithm::HS384);
        assert_eq!(config.auth.access_token_ttl_secs, 900);
        assert_eq!(config.cache.user_ttl_secs, 60);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let auth = AuthConfig {
            secret_key: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            auth.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
