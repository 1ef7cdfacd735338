//! Sliding-window limits on failed logins, per email and per source
//! address, computed from the login attempt ledger.

use bastion_core::models::login_attempt::{CreateLoginAttempt, LoginAttempt};
use bastion_core::repository::{LoginAttemptRepository, Store, UnitOfWork};
use chrono::{Duration, Utc};
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until the caller should retry; zero when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    fn blocked(window_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: window_secs,
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter<S: Store> {
    store: S,
    config: AuthConfig,
}

impl<S: Store> RateLimiter<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// Email is checked first; the address count is only consulted
    /// while the email is under its limit.
    pub async fn check(&self, email: &str, ip_address: &str) -> Result<RateLimitDecision, AuthError> {
        let since = Utc::now() - self.config.rate_limit_window();
        let attempts = self.store.login_attempts();

        let by_email = attempts.count_failures_by_email(email, since).await?;
        if by_email >= self.config.max_failures_per_email {
            warn!(email, failures = by_email, "Login rate limit reached for email");
            return Ok(RateLimitDecision::blocked(self.config.rate_limit_window_secs));
        }

        let by_address = attempts.count_failures_by_ip(ip_address, since).await?;
        if by_address >= self.config.max_failures_per_address {
            warn!(ip_address, failures = by_address, "Login rate limit reached for address");
            return Ok(RateLimitDecision::blocked(self.config.rate_limit_window_secs));
        }

        Ok(RateLimitDecision::allowed())
    }

    pub async fn record(&self, attempt: CreateLoginAttempt) -> Result<LoginAttempt, AuthError> {
        Ok(self.store.login_attempts().record(attempt).await?)
    }

    /// Stage the attempt row on `work` instead of writing it directly.
    pub fn stage_record(&self, work: &mut S::Work, attempt: CreateLoginAttempt) {
        work.record_login_attempt(attempt);
    }

    /// Delete attempt rows past the retention period.
    pub async fn cleanup(&self) -> Result<u64, AuthError> {
        let cutoff = Utc::now() - Duration::days(self.config.login_attempt_retention_days);
        Ok(self.store.login_attempts().delete_older_than(cutoff).await?)
    }

    /// Latest attempts for an email, newest first.
    pub async fn recent_attempts(
        &self,
        email: &str,
        limit: u64,
    ) -> Result<Vec<LoginAttempt>, AuthError> {
        Ok(self.store.login_attempts().recent_by_email(email, limit).await?)
    }
}
