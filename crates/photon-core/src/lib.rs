//! Photon Core - Domain models, collaborator traits, and shared types
//!
//! This crate defines the abstractions shared by the Photon services:
//! - User accounts and the closed role set
//! - The user store and mail collaborator traits
//! - Configuration management

pub mod config;
pub mod mail;
pub mod repository;
pub mod user;

pub use config::{
    AppConfig, AuthConfig, CacheConfig, ConfigError, DatabaseConfig, LoggingConfig, MailConfig,
    RateLimitConfig, ServerConfig, SigningAlgorithm,
};
pub use mail::{MailError, MailKind, Mailer, OutboundMail};
pub use repository::{RepositoryError, RepositoryResult, UserRepository};
pub use user::{NewUser, UnknownRole, User, UserPublic, UserRole};
