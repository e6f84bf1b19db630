//! Mailer implementations

use async_trait::async_trait;
use photon_core::{MailError, Mailer, OutboundMail};

/// Writes outgoing mail to the log instead of delivering it
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
    from_name: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>, from_name: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            from_name: from_name.into(),
        }
    }

    /// `From:` header value, e.g. `Photon <no-reply@photon.local>`
    pub fn sender(&self) -> String {
        if self.from_name.is_empty() {
            self.from.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from)
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        tracing::info!(
            from = %self.sender(),
            to = %mail.to,
            kind = ?mail.kind,
            subject = %mail.subject,
            link = %mail.link,
            "Outbound mail"
        );
        Ok(())
    }
}

/// Keeps every message in memory so tests can read the links back
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: tokio::sync::Mutex<Vec<OutboundMail>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryMailer {
    pub async fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().await.clone()
    }

    pub async fn last_link(&self) -> Option<String> {
        self.sent.lock().await.last().map(|mail| mail.link.clone())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        self.sent.lock().await.push(mail);
        Ok(())
    }
}
