//! Authentication error types.
//!
//! Every variant's message is safe to show to the caller. Storage and
//! crypto faults are logged where they happen and collapse into
//! [`AuthError::Internal`].

use bastion_core::error::CoreError;
use bastion_core::models::tenant::TenantStatus;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many failed attempts. Try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Account is locked. Try again in {remaining_secs} seconds")]
    AccountLocked { remaining_secs: u64 },

    #[error("Too many failed attempts. Account locked for {} minutes", .lockout_secs / 60)]
    AccountLockedNow { lockout_secs: u64 },

    #[error("Password does not meet requirements: {}", .0.join("; "))]
    WeakPassword(Vec<String>),

    #[error("Password was used recently")]
    PasswordReused,

    #[error("New password must differ from the current password")]
    PasswordUnchanged,

    #[error("Invalid or expired reset token")]
    ResetTokenInvalid,

    #[error("Token is expired or malformed")]
    TokenExpiredOrMalformed,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session belongs to another user")]
    OwnershipViolation,

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("Tenant is not active ({0})")]
    TenantNotActive(TenantStatus),

    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Log an unexpected fault and hide its details from the caller.
    pub(crate) fn internal(context: &str, detail: impl std::fmt::Display) -> Self {
        error!(context, error = %detail, "Internal authentication failure");
        AuthError::Internal
    }
}

impl From<CoreError> for AuthError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, .. } => AuthError::NotFound { entity },
            other => AuthError::internal("store", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_faults_are_opaque() {
        let err: AuthError = CoreError::Database("connection reset by peer".into()).into();
        assert!(matches!(err, AuthError::Internal));
        assert!(!err.to_string().contains("connection"));
    }

    #[test]
    fn not_found_keeps_entity() {
        let err: AuthError = CoreError::not_found("user", "42").into();
        assert_eq!(err.to_string(), "user not found");
    }

    #[test]
    fn lockout_message_is_in_minutes() {
        let err = AuthError::AccountLockedNow { lockout_secs: 1800 };
        assert!(err.to_string().contains("30 minutes"));
    }
}
