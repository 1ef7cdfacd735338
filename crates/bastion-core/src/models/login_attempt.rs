//! Login attempt ledger model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a credential check was rejected. Recorded on the attempt row and
/// in audit metadata; never returned to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureReason {
    RateLimited,
    UserNotFound,
    TenantMismatch,
    AccountLocked,
    InvalidPassword,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::RateLimited => "rate_limited",
            FailureReason::UserNotFound => "user_not_found",
            FailureReason::TenantMismatch => "tenant_mismatch",
            FailureReason::AccountLocked => "account_locked",
            FailureReason::InvalidPassword => "invalid_password",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_limited" => Some(FailureReason::RateLimited),
            "user_not_found" => Some(FailureReason::UserNotFound),
            "tenant_mismatch" => Some(FailureReason::TenantMismatch),
            "account_locked" => Some(FailureReason::AccountLocked),
            "invalid_password" => Some(FailureReason::InvalidPassword),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub email: String,
    pub ip_address: String,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    pub user_id: Option<Uuid>,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoginAttempt {
    pub email: String,
    pub ip_address: String,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    pub user_id: Option<Uuid>,
}

impl CreateLoginAttempt {
    pub fn failure(
        email: impl Into<String>,
        ip_address: impl Into<String>,
        reason: FailureReason,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            email: email.into(),
            ip_address: ip_address.into(),
            success: false,
            failure_reason: Some(reason),
            user_id,
        }
    }

    pub fn success(email: impl Into<String>, ip_address: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            email: email.into(),
            ip_address: ip_address.into(),
            success: true,
            failure_reason: None,
            user_id: Some(user_id),
        }
    }
}
