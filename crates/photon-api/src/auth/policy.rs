//! Role-based access gate

use crate::error::AppError;
use photon_core::{User, UserRole};

/// Requires the principal's role to allow `required`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    required: UserRole,
}

impl AccessPolicy {
    pub const fn new(required: UserRole) -> Self {
        Self { required }
    }

    pub fn required(&self) -> UserRole {
        self.required
    }

    pub fn check(&self, user: &User) -> Result<(), AppError> {
        if user.role.allows(self.required) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Access denied. Access open to \"{}\"",
                user.role
            )))
        }
    }
}
