//! Authentication service: the login state machine plus token refresh,
//! logout and session management on top of it.

use bastion_core::RequestContext;
use bastion_core::models::audit::AuditEventType;
use bastion_core::models::login_attempt::{CreateLoginAttempt, FailureReason};
use bastion_core::models::session::SessionInfo;
use bastion_core::models::user::{PublicUser, User};
use bastion_core::repository::{Store, UnitOfWork, UserRepository};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::lockout::{LockoutGuard, LockoutStatus};
use crate::password::PasswordPolicy;
use crate::portal::PortalResolver;
use crate::rate_limit::RateLimiter;
use crate::session::SessionStore;
use crate::token::{RefreshedAccess, TokenIssuer, TokenPair};

/// Credentials submitted by a client.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Portal the login was made through (subdomain or custom domain).
    pub tenant_identifier: Option<String>,
    pub remember_me: bool,
}

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginOutput {
    pub tokens: TokenPair,
    /// Session bound to the refresh token (can be used for logout).
    pub session_id: Uuid,
    pub user: PublicUser,
}

/// Authentication service.
///
/// Generic over the storage backend so that the auth layer has no
/// dependency on the database crate.
#[derive(Clone)]
pub struct AuthenticationService<S: Store> {
    store: S,
    config: AuthConfig,
    portal: PortalResolver<S>,
    rate_limiter: RateLimiter<S>,
    lockout: LockoutGuard<S>,
    passwords: PasswordPolicy<S>,
    tokens: TokenIssuer,
    sessions: SessionStore<S>,
    audit: AuditLog<S>,
}

impl<S: Store> AuthenticationService<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            portal: PortalResolver::new(store.clone()),
            rate_limiter: RateLimiter::new(store.clone(), config.clone()),
            lockout: LockoutGuard::new(store.clone(), config.clone()),
            passwords: PasswordPolicy::new(store.clone(), config.clone()),
            tokens: TokenIssuer::new(config.clone()),
            sessions: SessionStore::new(store.clone()),
            audit: AuditLog::new(store.clone()),
            store,
            config,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn sessions(&self) -> &SessionStore<S> {
        &self.sessions
    }

    pub fn lockout(&self) -> &LockoutGuard<S> {
        &self.lockout
    }

    pub fn rate_limiter(&self) -> &RateLimiter<S> {
        &self.rate_limiter
    }

    /// Check a login request and return the matching user.
    ///
    /// Every credential failure (unknown email, wrong portal, wrong
    /// password) yields the same [`AuthError::InvalidCredentials`].
    pub async fn validate_credentials(
        &self,
        request: &LoginRequest,
        ctx: &RequestContext,
    ) -> Result<PublicUser, AuthError> {
        let email = request.email.trim().to_lowercase();

        // 1. Rate limit.
        let decision = self.rate_limiter.check(&email, &ctx.ip_address).await?;
        if !decision.allowed {
            self.audit
                .record(
                    AuditEventType::LoginFailed,
                    ctx,
                    None,
                    Some(json!({ "email": email, "reason": FailureReason::RateLimited.as_str() })),
                )
                .await;
            return Err(AuthError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            });
        }

        // 2. User lookup.
        let user = match self.store.users().get_by_email(&email).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                self.passwords.verify_decoy(&request.password).await?;

                let mut work = self.store.begin();
                self.rate_limiter.stage_record(
                    &mut work,
                    CreateLoginAttempt::failure(
                        &email,
                        &ctx.ip_address,
                        FailureReason::UserNotFound,
                        None,
                    ),
                );
                work.commit().await?;

                warn!(email = %email, "Login failed: unknown user");
                self.audit
                    .record(
                        AuditEventType::LoginFailed,
                        ctx,
                        None,
                        Some(json!({ "email": email, "reason": FailureReason::UserNotFound.as_str() })),
                    )
                    .await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        // 3. Portal must belong to the user's tenant.
        if let Some(identifier) = &request.tenant_identifier {
            let tenant_matches = match self.portal.resolve(identifier).await {
                Ok(tenant) => user.tenant_id == Some(tenant.id),
                Err(AuthError::TenantNotFound | AuthError::TenantNotActive(_)) => false,
                Err(e) => return Err(e),
            };
            if !tenant_matches {
                self.record_credential_failure(&user, FailureReason::TenantMismatch, ctx)
                    .await?;
                return Err(AuthError::InvalidCredentials);
            }
        }

        // 4. Lockout. Counters stay untouched while locked.
        if let LockoutStatus::Locked { until } = self.lockout.check_lockout(user.id).await? {
            warn!(user_id = %user.id, "Login failed: account locked");
            self.audit
                .record(
                    AuditEventType::LoginFailed,
                    ctx,
                    Some(user.id),
                    Some(json!({ "email": email, "reason": FailureReason::AccountLocked.as_str() })),
                )
                .await;
            let remaining_ms = (until - Utc::now()).num_milliseconds().max(0);
            return Err(AuthError::AccountLocked {
                remaining_secs: (remaining_ms as u64).div_ceil(1000),
            });
        }

        // 5. Password.
        if !self
            .passwords
            .verify(&request.password, &user.password_hash)
            .await?
        {
            let now_locked = self
                .record_credential_failure(&user, FailureReason::InvalidPassword, ctx)
                .await?;
            if now_locked {
                return Err(AuthError::AccountLockedNow {
                    lockout_secs: self.config.lockout_duration_secs,
                });
            }
            return Err(AuthError::InvalidCredentials);
        }

        // 6. Success.
        self.lockout.reset_failed_attempts(user.id).await?;
        self.rate_limiter
            .record(CreateLoginAttempt::success(&email, &ctx.ip_address, user.id))
            .await?;

        Ok(user.into())
    }

    /// Write the failed attempt row and the lockout increment together,
    /// then audit. Returns whether this failure locked the account.
    async fn record_credential_failure(
        &self,
        user: &User,
        reason: FailureReason,
        ctx: &RequestContext,
    ) -> Result<bool, AuthError> {
        let was_locked = user.is_locked_at(Utc::now());

        let mut work = self.store.begin();
        self.rate_limiter.stage_record(
            &mut work,
            CreateLoginAttempt::failure(&user.email, &ctx.ip_address, reason, Some(user.id)),
        );
        self.lockout.stage_failed_attempt(&mut work, user.id);
        work.commit().await?;

        let after = self.store.users().get_by_id(user.id).await?;
        let status = self.lockout.status_after_commit(&after);

        warn!(
            user_id = %user.id,
            reason = reason.as_str(),
            failed_attempts = after.failed_login_attempts,
            "Login failed"
        );
        self.audit
            .record(
                AuditEventType::LoginFailed,
                ctx,
                Some(user.id),
                Some(json!({ "email": user.email, "reason": reason.as_str() })),
            )
            .await;

        let now_locked = !was_locked && status.is_locked();
        if let (true, LockoutStatus::Locked { until }) = (now_locked, status) {
            info!(user_id = %user.id, until = %until, "Account locked after failed logins");
            self.audit
                .record(
                    AuditEventType::AccountLocked,
                    ctx,
                    Some(user.id),
                    Some(json!({
                        "failedAttempts": after.failed_login_attempts,
                        "lockedUntil": until,
                    })),
                )
                .await;
        }
        Ok(now_locked)
    }

    /// Open a session for an already validated user.
    pub async fn login(
        &self,
        user: &PublicUser,
        ctx: &RequestContext,
        remember_me: bool,
    ) -> Result<LoginOutput, AuthError> {
        let tokens = self.tokens.issue_pair(user, remember_me)?;
        let session = self
            .sessions
            .create(user.id, &tokens.refresh_token, ctx, tokens.refresh_expires_in)
            .await?;

        let now = Utc::now();
        self.store
            .users()
            .record_login(user.id, now, ctx.ip_address.clone())
            .await?;

        info!(user_id = %user.id, session_id = %session.id, "Login succeeded");
        self.audit
            .record(
                AuditEventType::LoginSuccess,
                ctx,
                Some(user.id),
                Some(json!({ "sessionId": session.id, "rememberMe": remember_me })),
            )
            .await;

        let mut user = user.clone();
        user.last_login_at = Some(now);
        Ok(LoginOutput {
            tokens,
            session_id: session.id,
            user,
        })
    }

    /// Validate credentials and log in.
    pub async fn authenticate(
        &self,
        request: &LoginRequest,
        ctx: &RequestContext,
    ) -> Result<LoginOutput, AuthError> {
        let user = self.validate_credentials(request, ctx).await?;
        self.login(&user, ctx, request.remember_me).await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<RefreshedAccess, AuthError> {
        let refreshed = self.tokens.refresh(refresh_token, &self.sessions).await?;
        self.audit
            .record(
                AuditEventType::TokenRefresh,
                ctx,
                Some(refreshed.user_id),
                Some(json!({ "sessionId": refreshed.session_id })),
            )
            .await;
        Ok(refreshed)
    }

    /// Revoke the session behind a refresh token. Logging out twice, or
    /// with a token that has no session, is not an error.
    pub async fn logout(&self, refresh_token: &str, ctx: &RequestContext) -> Result<(), AuthError> {
        let (user_id, session_id) = match self.sessions.find_by_token(refresh_token).await? {
            Some(session) => {
                match self.sessions.revoke(session.id, session.user_id).await {
                    Ok(_) | Err(AuthError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
                (Some(session.user_id), Some(session.id))
            }
            None => (
                self.tokens
                    .decode_unverified(refresh_token)
                    .ok()
                    .map(|claims| claims.sub),
                None,
            ),
        };

        self.audit
            .record(
                AuditEventType::Logout,
                ctx,
                user_id,
                Some(json!({ "sessionId": session_id })),
            )
            .await;
        Ok(())
    }

    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        current_session: Option<Uuid>,
    ) -> Result<Vec<SessionInfo>, AuthError> {
        self.sessions.list_active(user_id, current_session).await
    }

    /// Revoke one of the caller's own sessions.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        requesting_user: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        self.sessions.revoke(session_id, requesting_user).await?;
        self.audit
            .record(
                AuditEventType::SessionRevoked,
                ctx,
                Some(requesting_user),
                Some(json!({ "sessionId": session_id })),
            )
            .await;
        Ok(())
    }

    /// Revoke every session of the caller except the current one.
    pub async fn revoke_other_sessions(
        &self,
        user_id: Uuid,
        current_session: Uuid,
        ctx: &RequestContext,
    ) -> Result<u64, AuthError> {
        let removed = self.sessions.revoke_others(user_id, current_session).await?;
        self.audit
            .record(
                AuditEventType::SessionRevoked,
                ctx,
                Some(user_id),
                Some(json!({ "keptSessionId": current_session, "revoked": removed })),
            )
            .await;
        Ok(removed)
    }
}
