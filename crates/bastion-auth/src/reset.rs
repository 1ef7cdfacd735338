//! Forgotten-password flow: request a token, validate it, complete it.
//!
//! Raw tokens are 32 random bytes, hex-encoded. Only their SHA-256
//! digest is stored.

use bastion_core::RequestContext;
use bastion_core::models::audit::AuditEventType;
use bastion_core::models::password_reset::CreatePasswordResetToken;
use bastion_core::repository::{PasswordResetRepository, Store, UnitOfWork, UserRepository};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::audit::AuditLog;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::PasswordPolicy;
use crate::session::SessionStore;
use crate::token::hash_token;

/// A freshly minted reset token. Delivery is up to the caller.
#[derive(Debug, Clone)]
pub struct ResetTokenIssued {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTokenProblem {
    NotFound,
    AlreadyUsed,
    Expired,
}

impl ResetTokenProblem {
    pub fn message(&self) -> &'static str {
        match self {
            ResetTokenProblem::NotFound => "Invalid token",
            ResetTokenProblem::AlreadyUsed => "Token already used",
            ResetTokenProblem::Expired => "Token expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTokenStatus {
    Valid { email: String },
    Invalid(ResetTokenProblem),
}

fn generate_reset_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct PasswordResetFlow<S: Store> {
    store: S,
    config: AuthConfig,
    passwords: PasswordPolicy<S>,
    sessions: SessionStore<S>,
    audit: AuditLog<S>,
}

impl<S: Store> PasswordResetFlow<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            passwords: PasswordPolicy::new(store.clone(), config.clone()),
            sessions: SessionStore::new(store.clone()),
            audit: AuditLog::new(store.clone()),
            store,
            config,
        }
    }

    /// Mint a reset token for `email`.
    ///
    /// An unknown address gets an equally well-formed token that is
    /// never stored, so the response does not reveal whether the
    /// account exists.
    pub async fn request(
        &self,
        email: &str,
        ctx: &RequestContext,
    ) -> Result<ResetTokenIssued, AuthError> {
        let email = email.trim().to_lowercase();
        let issued = ResetTokenIssued {
            token: generate_reset_token(),
            expires_at: Utc::now() + Duration::seconds(self.config.reset_token_lifetime_secs as i64),
        };

        let user = match self.store.users().get_by_email(&email).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!("Password reset requested for unknown email");
                return Ok(issued);
            }
            Err(e) => return Err(e.into()),
        };

        let mut work = self.store.begin();
        work.replace_reset_token(CreatePasswordResetToken {
            user_id: user.id,
            email: user.email.clone(),
            token_hash: hash_token(&issued.token),
            expires_at: issued.expires_at,
        });
        work.commit().await?;

        info!(user_id = %user.id, "Password reset requested");
        self.audit
            .record(
                AuditEventType::PasswordResetRequested,
                ctx,
                Some(user.id),
                Some(json!({ "email": user.email })),
            )
            .await;

        Ok(issued)
    }

    pub async fn validate(&self, token: &str) -> Result<ResetTokenStatus, AuthError> {
        let stored = match self.store.reset_tokens().get_by_token_hash(&hash_token(token)).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => {
                return Ok(ResetTokenStatus::Invalid(ResetTokenProblem::NotFound));
            }
            Err(e) => return Err(e.into()),
        };

        if stored.used {
            return Ok(ResetTokenStatus::Invalid(ResetTokenProblem::AlreadyUsed));
        }
        if stored.expires_at <= Utc::now() {
            return Ok(ResetTokenStatus::Invalid(ResetTokenProblem::Expired));
        }
        Ok(ResetTokenStatus::Valid {
            email: stored.email,
        })
    }

    /// Set a new password with a valid reset token. Signs the user out
    /// everywhere.
    pub async fn complete(
        &self,
        token: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        if let ResetTokenStatus::Invalid(problem) = self.validate(token).await? {
            debug!(problem = problem.message(), "Reset token rejected");
            return Err(AuthError::ResetTokenInvalid);
        }

        let tokens = self.store.reset_tokens();
        let stored = tokens.get_by_token_hash(&hash_token(token)).await?;
        let users = self.store.users();
        let user = users.get_by_id(stored.user_id).await?;

        self.passwords.ensure_acceptable(&user, new_password).await?;
        let new_hash = self.passwords.hash(new_password).await?;

        // Claim the token before writing so two concurrent completions
        // cannot both succeed.
        if !tokens.mark_used(stored.id).await? {
            return Err(AuthError::ResetTokenInvalid);
        }

        users.update_password(user.id, new_hash.clone()).await?;
        self.passwords.add_to_history(user.id, new_hash).await?;
        let revoked = self.sessions.revoke_all(user.id).await?;

        info!(user_id = %user.id, revoked_sessions = revoked, "Password reset completed");
        self.audit
            .record(
                AuditEventType::PasswordResetCompleted,
                ctx,
                Some(user.id),
                Some(json!({ "revokedSessions": revoked })),
            )
            .await;
        Ok(())
    }

    /// Delete expired reset tokens.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.reset_tokens().delete_expired(Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_tokens_are_64_hex_chars() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());
    }

    #[test]
    fn problem_messages() {
        assert_eq!(ResetTokenProblem::NotFound.message(), "Invalid token");
        assert_eq!(ResetTokenProblem::AlreadyUsed.message(), "Token already used");
        assert_eq!(ResetTokenProblem::Expired.message(), "Token expired");
    }
}
