//! Audit log domain model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailed,
    Logout,
    TokenRefresh,
    PasswordChanged,
    PasswordResetRequested,
    PasswordResetCompleted,
    AccountLocked,
    AccountUnlocked,
    SessionRevoked,
    UserCreated,
    TenantApproved,
    TenantRejected,
}

impl AuditEventType {
    pub const ALL: [AuditEventType; 13] = [
        AuditEventType::LoginSuccess,
        AuditEventType::LoginFailed,
        AuditEventType::Logout,
        AuditEventType::TokenRefresh,
        AuditEventType::PasswordChanged,
        AuditEventType::PasswordResetRequested,
        AuditEventType::PasswordResetCompleted,
        AuditEventType::AccountLocked,
        AuditEventType::AccountUnlocked,
        AuditEventType::SessionRevoked,
        AuditEventType::UserCreated,
        AuditEventType::TenantApproved,
        AuditEventType::TenantRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LoginSuccess => "LOGIN_SUCCESS",
            AuditEventType::LoginFailed => "LOGIN_FAILED",
            AuditEventType::Logout => "LOGOUT",
            AuditEventType::TokenRefresh => "TOKEN_REFRESH",
            AuditEventType::PasswordChanged => "PASSWORD_CHANGED",
            AuditEventType::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            AuditEventType::PasswordResetCompleted => "PASSWORD_RESET_COMPLETED",
            AuditEventType::AccountLocked => "ACCOUNT_LOCKED",
            AuditEventType::AccountUnlocked => "ACCOUNT_UNLOCKED",
            AuditEventType::SessionRevoked => "SESSION_REVOKED",
            AuditEventType::UserCreated => "USER_CREATED",
            AuditEventType::TenantApproved => "TENANT_APPROVED",
            AuditEventType::TenantRejected => "TENANT_REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub event_type: AuditEventType,
    pub user_id: Option<Uuid>,
    /// Tenant of `user_id` at the time of the event.
    pub tenant_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    pub event_type: AuditEventType,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Aggregates over a time range of the audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub events_by_type: HashMap<AuditEventType, u64>,
    pub distinct_users: u64,
    pub distinct_addresses: u64,
}
