//! Password change by an authenticated user.

use bastion_core::RequestContext;
use bastion_core::models::audit::AuditEventType;
use bastion_core::repository::{Store, UserRepository};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::PasswordPolicy;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct PasswordChangeFlow<S: Store> {
    store: S,
    passwords: PasswordPolicy<S>,
    sessions: SessionStore<S>,
    audit: AuditLog<S>,
}

impl<S: Store> PasswordChangeFlow<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            passwords: PasswordPolicy::new(store.clone(), config),
            sessions: SessionStore::new(store.clone()),
            audit: AuditLog::new(store.clone()),
            store,
        }
    }

    /// Replace the user's password.
    ///
    /// Every other session of the user is revoked; `current_session`
    /// stays valid. Without a current session all sessions go.
    pub async fn change(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        current_session: Option<Uuid>,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let users = self.store.users();
        let user = users.get_by_id(user_id).await?;

        if !self
            .passwords
            .verify(current_password, &user.password_hash)
            .await?
        {
            warn!(user_id = %user_id, "Password change rejected: wrong current password");
            return Err(AuthError::Unauthorized);
        }

        self.passwords.ensure_acceptable(&user, new_password).await?;

        let new_hash = self.passwords.hash(new_password).await?;
        users.update_password(user_id, new_hash.clone()).await?;
        self.passwords.add_to_history(user_id, new_hash).await?;

        let revoked = match current_session {
            Some(keep) => self.sessions.revoke_others(user_id, keep).await?,
            None => self.sessions.revoke_all(user_id).await?,
        };

        info!(user_id = %user_id, revoked_sessions = revoked, "Password changed");
        self.audit
            .record(
                AuditEventType::PasswordChanged,
                ctx,
                Some(user_id),
                Some(json!({ "revokedSessions": revoked })),
            )
            .await;
        Ok(())
    }
}
