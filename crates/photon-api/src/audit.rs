//! Security audit logging for authentication events
//!
//! All audit events are logged with the "audit" tracing target, making them
//! easy to filter and route to security monitoring. Each event is also
//! serialized to JSON in the `event` field for log aggregators.
//!
//! ```ignore
//! use photon_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     email: user.email.clone(),
//! });
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: Uuid,
        email: String,
    },

    LoginFailure {
        email: String,
        reason: String,
    },

    Logout {
        user_id: Uuid,
        email: String,
    },

    TokenRefresh {
        user_id: Uuid,
        email: String,
    },

    /// A refresh token other than the stored one was presented.
    /// The stored token has been cleared.
    RefreshTokenReuse {
        user_id: Uuid,
        email: String,
    },

    Signup {
        user_id: Uuid,
        email: String,
        role: String,
    },

    EmailConfirmed {
        user_id: Uuid,
        email: String,
    },

    PasswordResetRequested {
        email: String,
    },

    PasswordReset {
        user_id: Uuid,
        email: String,
    },

    PasswordChanged {
        user_id: Uuid,
        email: String,
    },

    RoleChanged {
        user_id: Uuid,
        role: String,
        changed_by: Uuid,
    },

    ActiveChanged {
        user_id: Uuid,
        is_active: bool,
        changed_by: Uuid,
    },

    /// Access denied due to insufficient role
    AccessDenied {
        user_id: Uuid,
        email: String,
        role: String,
        required_role: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Invalid, expired, revoked or wrongly scoped token used
    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Revocation store or user store could not be reached
    StoreUnavailable {
        operation: String,
        reason: String,
    },
}

impl AuditEvent {
    fn message(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshTokenReuse { .. } => "Refresh token reuse detected",
            AuditEvent::Signup { .. } => "User signup",
            AuditEvent::EmailConfirmed { .. } => "Email confirmed",
            AuditEvent::PasswordResetRequested { .. } => "Password reset requested",
            AuditEvent::PasswordReset { .. } => "Password reset",
            AuditEvent::PasswordChanged { .. } => "Password changed",
            AuditEvent::RoleChanged { .. } => "Role changed",
            AuditEvent::ActiveChanged { .. } => "Active flag changed",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::StoreUnavailable { .. } => "Store unavailable",
        }
    }

    fn is_warning(&self) -> bool {
        matches!(
            self,
            AuditEvent::RefreshTokenReuse { .. } | AuditEvent::StoreUnavailable { .. }
        )
    }
}

/// Log a security audit event with structured fields
///
/// Suspicious events (refresh token reuse, store outages) are logged at
/// WARN, everything else at INFO.
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    if event.is_warning() {
        warn!(target: "audit", event = %event_json, "{}", event.message());
    } else {
        info!(target: "audit", event = %event_json, "{}", event.message());
    }
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    // Check X-Forwarded-For (proxy/load balancer)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // Take the first IP in the chain (client IP)
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::RefreshTokenReuse {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"refresh_token_reuse\""));
        assert!(json.contains("test@example.com"));
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::LoginFailure {
            email: "test@example.com".to_string(),
            reason: "Invalid password".to_string(),
        });
        audit_log(&AuditEvent::StoreUnavailable {
            operation: "blacklist lookup".to_string(),
            reason: "timed out".to_string(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = axum::http::HeaderMap::new();

        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }
}
