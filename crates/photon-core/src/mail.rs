//! Outbound mail collaborator
//!
//! Delivery itself lives outside this workspace; services only build the
//! message and hand it to a [`Mailer`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a message is for. Templates are chosen by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailKind {
    ConfirmEmail,
    ResetPassword,
}

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMail {
    pub kind: MailKind,
    pub to: String,
    pub username: String,
    pub subject: String,
    /// Link carrying the email token
    pub link: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}
