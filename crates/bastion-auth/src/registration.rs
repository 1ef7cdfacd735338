//! Tenant onboarding and operator approval.

use bastion_core::RequestContext;
use bastion_core::models::audit::AuditEventType;
use bastion_core::models::tenant::{CreateTenant, Tenant, TenantStatus};
use bastion_core::models::user::{CreateUser, PublicUser, UserRole};
use bastion_core::repository::{Store, TenantRepository, UnitOfWork, UserRepository};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::{PasswordIdentity, PasswordPolicy, score_strength};
use crate::portal::{PortalResolver, normalize_identifier, validate_subdomain_format};

/// Input for a self-service tenant registration.
#[derive(Debug, Clone)]
pub struct RegisterTenant {
    pub name: String,
    /// Contact address of the organization.
    pub email: String,
    pub subdomain: String,
    pub custom_domain: Option<String>,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub tenant: Tenant,
    pub admin: PublicUser,
}

async fn exists<T>(
    lookup: impl Future<Output = bastion_core::CoreResult<T>>,
) -> Result<bool, AuthError> {
    match lookup.await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[derive(Clone)]
pub struct RegistrationFlow<S: Store> {
    store: S,
    portal: PortalResolver<S>,
    passwords: PasswordPolicy<S>,
    audit: AuditLog<S>,
}

impl<S: Store> RegistrationFlow<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            portal: PortalResolver::new(store.clone()),
            passwords: PasswordPolicy::new(store.clone(), config),
            audit: AuditLog::new(store.clone()),
            store,
        }
    }

    /// Register a tenant and its first administrator.
    ///
    /// All checks run before anything is written. The tenant, the admin
    /// user and the admin's first history entry are committed together.
    pub async fn register(
        &self,
        input: RegisterTenant,
        ctx: &RequestContext,
    ) -> Result<Registration, AuthError> {
        let subdomain = input.subdomain.trim().to_lowercase();
        let tenant_email = input.email.trim().to_lowercase();
        let admin_email = input.admin_email.trim().to_lowercase();

        validate_subdomain_format(&subdomain)?;
        if !self.portal.is_subdomain_available(&subdomain).await? {
            return Err(AuthError::BadRequest("Subdomain is already taken".into()));
        }
        if exists(self.store.tenants().get_by_email(&tenant_email)).await? {
            return Err(AuthError::BadRequest(
                "A tenant with this email already exists".into(),
            ));
        }
        if exists(self.store.users().get_by_email(&admin_email)).await? {
            return Err(AuthError::BadRequest("Email is already registered".into()));
        }

        let report = score_strength(
            &input.admin_password,
            PasswordIdentity {
                name: &input.admin_name,
                email: &admin_email,
            },
        );
        if !report.is_valid {
            return Err(AuthError::WeakPassword(report.feedback));
        }
        let password_hash = self.passwords.hash(&input.admin_password).await?;

        let mut work = self.store.begin();
        let tenant = work.create_tenant(CreateTenant {
            name: input.name,
            email: tenant_email,
            subdomain,
            custom_domain: input
                .custom_domain
                .as_deref()
                .map(normalize_identifier)
                .filter(|d| !d.is_empty()),
            status: TenantStatus::PendingVerification,
        });
        let admin = work.create_user(CreateUser {
            tenant_id: Some(tenant.id),
            email: admin_email,
            name: input.admin_name,
            password_hash: password_hash.clone(),
            role: UserRole::TenantAdmin,
            require_password_change: false,
        });
        work.append_password_history(admin.id, password_hash);
        work.commit().await?;

        info!(
            tenant_id = %tenant.id,
            subdomain = %tenant.subdomain,
            admin_id = %admin.id,
            "Tenant registered"
        );
        self.audit
            .record(
                AuditEventType::UserCreated,
                ctx,
                Some(admin.id),
                Some(json!({
                    "tenantId": tenant.id,
                    "tenantName": tenant.name,
                    "subdomain": tenant.subdomain,
                    "role": admin.role.as_str(),
                })),
            )
            .await;

        Ok(Registration {
            tenant,
            admin: admin.into(),
        })
    }

    async fn transition(
        &self,
        tenant_id: Uuid,
        to: TenantStatus,
    ) -> Result<Tenant, AuthError> {
        let tenants = self.store.tenants();
        match tenants
            .transition_status(tenant_id, TenantStatus::PendingVerification, to)
            .await?
        {
            Some(tenant) => Ok(tenant),
            None => {
                let current = tenants.get_by_id(tenant_id).await?;
                Err(AuthError::BadRequest(format!(
                    "Tenant is not pending verification (status: {})",
                    current.status
                )))
            }
        }
    }

    /// Activate a pending tenant.
    pub async fn approve(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Tenant, AuthError> {
        let tenant = self.transition(tenant_id, TenantStatus::Active).await?;
        info!(tenant_id = %tenant_id, actor_id = %actor_id, "Tenant approved");
        self.audit
            .record(
                AuditEventType::TenantApproved,
                ctx,
                Some(actor_id),
                Some(json!({ "tenantId": tenant_id, "subdomain": tenant.subdomain })),
            )
            .await;
        Ok(tenant)
    }

    /// Turn down a pending tenant. The tenant is kept, suspended.
    pub async fn reject(
        &self,
        tenant_id: Uuid,
        reason: &str,
        actor_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Tenant, AuthError> {
        let tenant = self.transition(tenant_id, TenantStatus::Suspended).await?;
        info!(tenant_id = %tenant_id, actor_id = %actor_id, reason, "Tenant rejected");
        self.audit
            .record(
                AuditEventType::TenantRejected,
                ctx,
                Some(actor_id),
                Some(json!({
                    "tenantId": tenant_id,
                    "subdomain": tenant.subdomain,
                    "reason": reason,
                })),
            )
            .await;
        Ok(tenant)
    }
}
