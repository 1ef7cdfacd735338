//! Tenant portal resolution and subdomain rules.

use bastion_core::models::tenant::Tenant;
use bastion_core::repository::{Store, TenantRepository};
use tracing::debug;

use crate::error::AuthError;

/// Labels that can never be claimed as a tenant subdomain.
pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "www",
    "api",
    "admin",
    "app",
    "mail",
    "ftp",
    "localhost",
    "staging",
    "dev",
    "test",
];

const MIN_SUBDOMAIN_LEN: usize = 3;
const MAX_SUBDOMAIN_LEN: usize = 63;

/// Reduce a user-supplied portal identifier to the stored form:
/// `" HTTPS://www.Acme.io/ "` becomes `"acme.io"`.
pub fn normalize_identifier(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    without_www.trim_end_matches('/').to_string()
}

/// Check that `subdomain` is a usable portal label.
pub fn validate_subdomain_format(subdomain: &str) -> Result<(), AuthError> {
    let len = subdomain.len();
    if !(MIN_SUBDOMAIN_LEN..=MAX_SUBDOMAIN_LEN).contains(&len) {
        return Err(AuthError::BadRequest(format!(
            "Subdomain must be between {MIN_SUBDOMAIN_LEN} and {MAX_SUBDOMAIN_LEN} characters"
        )));
    }
    if !subdomain
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AuthError::BadRequest(
            "Subdomain may only contain lowercase letters, digits and hyphens".into(),
        ));
    }
    if subdomain.starts_with('-') || subdomain.ends_with('-') {
        return Err(AuthError::BadRequest(
            "Subdomain cannot start or end with a hyphen".into(),
        ));
    }
    if subdomain.contains("--") {
        return Err(AuthError::BadRequest(
            "Subdomain cannot contain consecutive hyphens".into(),
        ));
    }
    if RESERVED_SUBDOMAINS.contains(&subdomain) {
        return Err(AuthError::BadRequest(format!(
            "Subdomain '{subdomain}' is reserved"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PortalResolver<S: Store> {
    store: S,
}

impl<S: Store> PortalResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Find the active tenant behind a subdomain or custom domain.
    pub async fn resolve(&self, identifier: &str) -> Result<Tenant, AuthError> {
        let normalized = normalize_identifier(identifier);
        let tenant = match self.store.tenants().get_by_identifier(&normalized).await {
            Ok(tenant) => tenant,
            Err(e) if e.is_not_found() => {
                debug!(identifier = %normalized, "No tenant for portal identifier");
                return Err(AuthError::TenantNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if !tenant.is_active() {
            return Err(AuthError::TenantNotActive(tenant.status));
        }
        Ok(tenant)
    }

    pub async fn is_subdomain_available(&self, subdomain: &str) -> Result<bool, AuthError> {
        Ok(!self.store.tenants().subdomain_exists(subdomain).await?)
    }
}
