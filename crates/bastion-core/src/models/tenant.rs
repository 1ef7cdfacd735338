//! Tenant domain model.
//!
//! A tenant is one organization sharing the deployment. Its portal is
//! reached through a subdomain of the platform or an optional custom
//! domain, and it only serves logins while [`TenantStatus::Active`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TenantStatus {
    /// Registered through onboarding, waiting for a platform operator.
    PendingVerification,
    Active,
    /// Rejected during onboarding or suspended afterwards.
    Suspended,
    Deactivated,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::PendingVerification => "PendingVerification",
            TenantStatus::Active => "Active",
            TenantStatus::Suspended => "Suspended",
            TenantStatus::Deactivated => "Deactivated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PendingVerification" => Some(TenantStatus::PendingVerification),
            "Active" => Some(TenantStatus::Active),
            "Suspended" => Some(TenantStatus::Suspended),
            "Deactivated" => Some(TenantStatus::Deactivated),
            _ => None,
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Contact address of the organization. Unique across tenants.
    pub email: String,
    /// Portal label, e.g. `acme` for `acme.<platform domain>`.
    pub subdomain: String,
    pub custom_domain: Option<String>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// Fields required to create a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub email: String,
    pub subdomain: String,
    pub custom_domain: Option<String>,
    pub status: TenantStatus,
}
