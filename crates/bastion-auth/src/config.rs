//! Authentication configuration.

use chrono::Duration;

/// Configuration for the authentication pipeline.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret used to sign access and refresh tokens (HS256).
    pub jwt_secret: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
    /// Refresh token lifetime when the user asked to be remembered
    /// (default: 2_592_000 = 30 days).
    pub remember_me_lifetime_secs: u64,
    /// Consecutive failed logins before lockout (default: 5).
    pub max_failed_login_attempts: u32,
    /// Lockout duration in seconds (default: 1800 = 30 minutes).
    pub lockout_duration_secs: u64,
    /// Sliding window for the rate limiter (default: 900 = 15 minutes).
    pub rate_limit_window_secs: u64,
    /// Failed attempts per email within the window (default: 5).
    pub max_failures_per_email: u64,
    /// Failed attempts per source address within the window (default: 10).
    pub max_failures_per_address: u64,
    /// Login attempt rows older than this are swept (default: 30).
    pub login_attempt_retention_days: i64,
    /// Password reset token lifetime in seconds (default: 3600 = 1 hour).
    pub reset_token_lifetime_secs: u64,
    /// Number of previous password hashes kept per user (default: 5).
    pub password_history_depth: u64,
    /// Audit entries older than this are purged (default: 90).
    pub audit_retention_days: i64,
    /// Sessions idle longer than this are no longer valid (default: 30).
    pub session_idle_timeout_mins: i64,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Argon2id memory cost in KiB (default: 19456 = 19 MiB).
    pub argon2_memory_kib: u32,
    /// Argon2id iterations (default: 2).
    pub argon2_iterations: u32,
    /// Argon2id lanes (default: 1).
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "bastion".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
            remember_me_lifetime_secs: 2_592_000,
            max_failed_login_attempts: 5,
            lockout_duration_secs: 1800,
            rate_limit_window_secs: 900,
            max_failures_per_email: 5,
            max_failures_per_address: 10,
            login_attempt_retention_days: 30,
            reset_token_lifetime_secs: 3600,
            password_history_depth: 5,
            audit_retention_days: 90,
            session_idle_timeout_mins: 30,
            pepper: None,
            // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl AuthConfig {
    pub(crate) fn lockout_duration(&self) -> Duration {
        Duration::seconds(self.lockout_duration_secs as i64)
    }

    pub(crate) fn rate_limit_window(&self) -> Duration {
        Duration::seconds(self.rate_limit_window_secs as i64)
    }

    /// Refresh token lifetime for the given remember-me choice.
    pub fn refresh_lifetime_secs(&self, remember_me: bool) -> u64 {
        if remember_me {
            self.remember_me_lifetime_secs
        } else {
            self.refresh_token_lifetime_secs
        }
    }
}
