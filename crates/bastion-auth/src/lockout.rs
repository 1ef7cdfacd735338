//! Per-account lockout after consecutive failed logins.

use bastion_core::RequestContext;
use bastion_core::models::audit::AuditEventType;
use bastion_core::models::user::User;
use bastion_core::repository::{Store, UnitOfWork, UserRepository};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    Locked { until: DateTime<Utc> },
    Unlocked { attempts_remaining: u32 },
}

impl LockoutStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockoutStatus::Locked { .. })
    }
}

#[derive(Clone)]
pub struct LockoutGuard<S: Store> {
    store: S,
    config: AuthConfig,
    audit: AuditLog<S>,
}

impl<S: Store> LockoutGuard<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            audit: AuditLog::new(store.clone()),
            store,
            config,
        }
    }

    fn status_of(&self, user: &User, now: DateTime<Utc>) -> LockoutStatus {
        match user.locked_until {
            Some(until) if until > now => LockoutStatus::Locked { until },
            _ => LockoutStatus::Unlocked {
                attempts_remaining: self
                    .config
                    .max_failed_login_attempts
                    .saturating_sub(user.failed_login_attempts),
            },
        }
    }

    /// Current lock state. A lock that has already lapsed is cleared
    /// on the way, restoring the full attempt budget.
    pub async fn check_lockout(&self, user_id: Uuid) -> Result<LockoutStatus, AuthError> {
        let users = self.store.users();
        let user = users.get_by_id(user_id).await?;
        let now = Utc::now();

        if user.locked_until.is_some_and(|until| until <= now) {
            users.clear_expired_lockout(user_id, now).await?;
            info!(user_id = %user_id, "Expired lockout cleared");
            return Ok(LockoutStatus::Unlocked {
                attempts_remaining: self.config.max_failed_login_attempts,
            });
        }

        Ok(self.status_of(&user, now))
    }

    /// Count one more failure, locking the account when the threshold
    /// is reached.
    pub async fn record_failed_attempt(&self, user_id: Uuid) -> Result<LockoutStatus, AuthError> {
        let now = Utc::now();
        let user = self
            .store
            .users()
            .increment_failed_attempts(
                user_id,
                self.config.max_failed_login_attempts,
                now + self.config.lockout_duration(),
            )
            .await?;

        let status = self.status_of(&user, now);
        if let LockoutStatus::Locked { until } = status {
            info!(user_id = %user_id, until = %until, "Account locked");
        }
        Ok(status)
    }

    /// Stage the same increment as [`LockoutGuard::record_failed_attempt`]
    /// on `work`.
    pub fn stage_failed_attempt(&self, work: &mut S::Work, user_id: Uuid) {
        work.increment_failed_attempts(
            user_id,
            self.config.max_failed_login_attempts,
            Utc::now() + self.config.lockout_duration(),
        );
    }

    /// Lock state as it would be reported right after a staged
    /// increment was committed.
    pub fn status_after_commit(&self, user: &User) -> LockoutStatus {
        self.status_of(user, Utc::now())
    }

    pub async fn reset_failed_attempts(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.users().clear_failed_attempts(user_id).await?;
        Ok(())
    }

    /// Privileged manual unlock.
    pub async fn unlock_account(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let users = self.store.users();
        users.get_by_id(user_id).await?;
        users.clear_failed_attempts(user_id).await?;
        info!(user_id = %user_id, actor_id = %actor_id, "Account unlocked");

        self.audit
            .record(
                AuditEventType::AccountUnlocked,
                ctx,
                Some(user_id),
                Some(json!({ "unlockedBy": actor_id })),
            )
            .await;
        Ok(())
    }
}
