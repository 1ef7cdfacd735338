//! Periodic retention sweeps. Each one is idempotent and only talks to
//! the store, so they can run on independent schedules alongside
//! request traffic.

use bastion_core::repository::Store;
use tracing::debug;

use crate::audit::AuditLog;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::rate_limit::RateLimiter;
use crate::reset::PasswordResetFlow;
use crate::session::SessionStore;

/// Rows removed by one [`Maintenance::run_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub login_attempts: u64,
    pub audit_entries: u64,
    pub sessions: u64,
    pub reset_tokens: u64,
}

#[derive(Clone)]
pub struct Maintenance<S: Store> {
    config: AuthConfig,
    rate_limiter: RateLimiter<S>,
    audit: AuditLog<S>,
    sessions: SessionStore<S>,
    resets: PasswordResetFlow<S>,
}

impl<S: Store> Maintenance<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(store.clone(), config.clone()),
            audit: AuditLog::new(store.clone()),
            sessions: SessionStore::new(store.clone()),
            resets: PasswordResetFlow::new(store, config.clone()),
            config,
        }
    }

    /// Login attempts past their retention period.
    pub async fn sweep_login_attempts(&self) -> Result<u64, AuthError> {
        let removed = self.rate_limiter.cleanup().await?;
        debug!(removed, "Swept login attempts");
        Ok(removed)
    }

    /// Audit entries past their retention period.
    pub async fn sweep_audit_log(&self) -> Result<u64, AuthError> {
        let removed = self
            .audit
            .purge_older_than(self.config.audit_retention_days)
            .await?;
        debug!(removed, "Purged audit entries");
        Ok(removed)
    }

    pub async fn sweep_sessions(&self) -> Result<u64, AuthError> {
        let removed = self.sessions.cleanup_expired().await?;
        debug!(removed, "Swept expired sessions");
        Ok(removed)
    }

    pub async fn sweep_reset_tokens(&self) -> Result<u64, AuthError> {
        let removed = self.resets.cleanup_expired().await?;
        debug!(removed, "Swept expired reset tokens");
        Ok(removed)
    }

    pub async fn run_all(&self) -> Result<SweepReport, AuthError> {
        Ok(SweepReport {
            login_attempts: self.sweep_login_attempts().await?,
            audit_entries: self.sweep_audit_log().await?,
            sessions: self.sweep_sessions().await?,
            reset_tokens: self.sweep_reset_tokens().await?,
        })
    }
}
