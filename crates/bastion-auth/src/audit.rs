//! Security audit trail.

use bastion_core::RequestContext;
use bastion_core::models::audit::{
    AuditEventType, AuditLogEntry, AuditStatistics, CreateAuditLogEntry,
};
use bastion_core::repository::{
    AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination, Store, UserRepository,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Clone)]
pub struct AuditLog<S: Store> {
    store: S,
}

impl<S: Store> AuditLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append an entry. When `user_id` is set, the entry is stamped with
    /// that user's current tenant.
    pub async fn log(
        &self,
        event_type: AuditEventType,
        ctx: &RequestContext,
        user_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> Result<AuditLogEntry, AuthError> {
        let tenant_id = match user_id {
            Some(id) => match self.store.users().get_by_id(id).await {
                Ok(user) => user.tenant_id,
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let entry = self
            .store
            .audit_log()
            .append(CreateAuditLogEntry {
                event_type,
                user_id,
                tenant_id,
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                metadata,
            })
            .await?;
        debug!(event = event_type.as_str(), "Audit entry written");
        Ok(entry)
    }

    /// Like [`AuditLog::log`], but a failure is only logged.
    pub async fn record(
        &self,
        event_type: AuditEventType,
        ctx: &RequestContext,
        user_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.log(event_type, ctx, user_id, metadata).await {
            warn!(event = event_type.as_str(), error = %e, "Failed to write audit entry");
        }
    }

    pub async fn search(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> Result<PaginatedResult<AuditLogEntry>, AuthError> {
        Ok(self.store.audit_log().search(filter, pagination).await?)
    }

    pub async fn statistics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AuditStatistics, AuthError> {
        if from > to {
            return Err(AuthError::BadRequest("Invalid date range".into()));
        }
        Ok(self.store.audit_log().statistics(from, to).await?)
    }

    /// Delete entries older than `days` days.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, AuthError> {
        let cutoff = Utc::now() - Duration::days(days);
        Ok(self.store.audit_log().delete_older_than(cutoff).await?)
    }
}
