//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UserRole {
    /// Operator of the whole deployment. Not bound to a tenant.
    PlatformAdmin,
    TenantAdmin,
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::PlatformAdmin => "PlatformAdmin",
            UserRole::TenantAdmin => "TenantAdmin",
            UserRole::Member => "Member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PlatformAdmin" => Some(UserRole::PlatformAdmin),
            "TenantAdmin" => Some(UserRole::TenantAdmin),
            "Member" => Some(UserRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    /// Lowercased login address. Unique across the deployment.
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: UserRole,
    /// Consecutive failed logins since the last success or unlock.
    pub failed_login_attempts: u32,
    /// Set together with `failed_login_attempts` reaching the lockout
    /// threshold; both are cleared together.
    pub locked_until: Option<DateTime<Utc>>,
    pub require_password_change: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A user is locked iff `locked_until` exists and lies after `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Fields required to create a new user. The password arrives already
/// hashed; storage never sees plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub require_password_change: bool,
}

/// Projection of [`User`] that is safe to hand to callers. It never
/// carries the password hash or the lockout bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub require_password_change: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            name: user.name,
            role: user.role,
            require_password_change: user.require_password_change,
            last_login_at: user.last_login_at,
        }
    }
}
