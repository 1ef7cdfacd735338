//! Refresh-token sessions.
//!
//! A session is the server-side half of a refresh token: it is looked
//! up by the token's SHA-256 digest and deleting it revokes the token.

use bastion_core::RequestContext;
use bastion_core::models::session::{CreateSession, Session, SessionInfo};
use bastion_core::repository::{SessionRepository, Store};
use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AuthError;
use crate::token::hash_token;

#[derive(Clone)]
pub struct SessionStore<S: Store> {
    store: S,
}

impl<S: Store> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Open a session bound to `refresh_token`, expiring `ttl_secs`
    /// from now.
    pub async fn create(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        ctx: &RequestContext,
        ttl_secs: u64,
    ) -> Result<Session, AuthError> {
        let session = self
            .store
            .sessions()
            .create(CreateSession {
                user_id,
                token_hash: hash_token(refresh_token),
                ip_address: Some(ctx.ip_address.clone()),
                user_agent: ctx.user_agent.clone(),
                expires_at: Utc::now() + Duration::seconds(ttl_secs as i64),
            })
            .await?;
        debug!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok(session)
    }

    /// Session bound to a raw refresh token, expired or not.
    pub async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, AuthError> {
        match self
            .store
            .sessions()
            .get_by_token_hash(&hash_token(refresh_token))
            .await
        {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Non-expired sessions, most recently active first. The one whose
    /// id equals `current` is flagged.
    pub async fn list_active(
        &self,
        user_id: Uuid,
        current: Option<Uuid>,
    ) -> Result<Vec<SessionInfo>, AuthError> {
        let sessions = self
            .store
            .sessions()
            .list_active(user_id, Utc::now())
            .await?;
        Ok(sessions
            .into_iter()
            .map(|s| SessionInfo {
                is_current: current == Some(s.id),
                id: s.id,
                ip_address: s.ip_address,
                user_agent: s.user_agent,
                created_at: s.created_at,
                last_activity_at: s.last_activity_at,
                expires_at: s.expires_at,
            })
            .collect())
    }

    pub async fn touch(&self, session_id: Uuid) -> Result<bool, AuthError> {
        Ok(self.store.sessions().touch(session_id).await?)
    }

    /// Delete a session on behalf of its owner. Returns the deleted
    /// session.
    pub async fn revoke(
        &self,
        session_id: Uuid,
        requesting_user: Uuid,
    ) -> Result<Session, AuthError> {
        let sessions = self.store.sessions();
        let session = sessions.get_by_id(session_id).await?;
        if session.user_id != requesting_user {
            return Err(AuthError::OwnershipViolation);
        }
        sessions.delete(session_id).await?;
        info!(session_id = %session_id, user_id = %requesting_user, "Session revoked");
        Ok(session)
    }

    /// Delete every session of `user_id` except `keep`.
    pub async fn revoke_others(&self, user_id: Uuid, keep: Uuid) -> Result<u64, AuthError> {
        let removed = self
            .store
            .sessions()
            .delete_for_user_except(user_id, keep)
            .await?;
        info!(user_id = %user_id, removed, "Other sessions revoked");
        Ok(removed)
    }

    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let removed = self.store.sessions().delete_for_user(user_id).await?;
        info!(user_id = %user_id, removed, "All sessions revoked");
        Ok(removed)
    }

    /// A session is valid while it exists, has not expired and has seen
    /// activity within the last `max_idle_mins` minutes.
    pub async fn is_valid(&self, session_id: Uuid, max_idle_mins: i64) -> Result<bool, AuthError> {
        let session = match self.store.sessions().get_by_id(session_id).await {
            Ok(session) => session,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let now = Utc::now();
        if session.is_expired_at(now) {
            return Ok(false);
        }
        Ok(now - session.last_activity_at <= Duration::minutes(max_idle_mins))
    }

    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.sessions().delete_expired(Utc::now()).await?)
    }
}
