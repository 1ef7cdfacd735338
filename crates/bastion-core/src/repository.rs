//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Every method is a single
//! round-trip to the store; multi-write sequences that must land
//! together go through a [`UnitOfWork`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::{
    audit::{AuditEventType, AuditLogEntry, AuditStatistics, CreateAuditLogEntry},
    login_attempt::{CreateLoginAttempt, LoginAttempt},
    password_history::PasswordHistoryEntry,
    password_reset::{CreatePasswordResetToken, PasswordResetToken},
    session::{CreateSession, Session},
    tenant::{CreateTenant, Tenant, TenantStatus},
    user::{CreateUser, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Tenants & users
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = CoreResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<Tenant>> + Send;
    fn get_by_subdomain(&self, subdomain: &str)
    -> impl Future<Output = CoreResult<Tenant>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = CoreResult<Tenant>> + Send;
    /// Look up a tenant whose subdomain OR custom domain equals the
    /// (already normalized) identifier.
    fn get_by_identifier(
        &self,
        identifier: &str,
    ) -> impl Future<Output = CoreResult<Tenant>> + Send;
    fn subdomain_exists(&self, subdomain: &str) -> impl Future<Output = CoreResult<bool>> + Send;
    /// Compare-and-set on the status field. Returns `None` when the
    /// tenant was not in `from` (or does not exist).
    fn transition_status(
        &self,
        id: Uuid,
        from: TenantStatus,
        to: TenantStatus,
    ) -> impl Future<Output = CoreResult<Option<Tenant>>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = CoreResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = CoreResult<User>> + Send;
    /// Atomically add one to the failure counter and, when the new value
    /// reaches `max_attempts`, set `locked_until = lock_until`. Returns
    /// the user as stored after the increment.
    fn increment_failed_attempts(
        &self,
        id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<User>> + Send;
    /// Clear the failure counter and lockout timestamp together.
    fn clear_failed_attempts(&self, id: Uuid) -> impl Future<Output = CoreResult<()>> + Send;
    /// Clear the failure counter and lockout timestamp together, but only
    /// if the lock has already lapsed at `now`. Returns whether anything
    /// was cleared.
    fn clear_expired_lockout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<bool>> + Send;
    /// Store a new password hash and clear `require_password_change`.
    fn update_password(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> impl Future<Output = CoreResult<()>> + Send;
    fn record_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip_address: String,
    ) -> impl Future<Output = CoreResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession) -> impl Future<Output = CoreResult<Session>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<Session>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = CoreResult<Session>> + Send;
    /// Non-expired sessions of a user, most recently active first.
    fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<Vec<Session>>> + Send;
    /// Bump `last_activity_at` of a non-expired session. Returns `false`
    /// if the session is gone or expired.
    fn touch(&self, id: Uuid) -> impl Future<Output = CoreResult<bool>> + Send;
    /// Returns whether a session was deleted.
    fn delete(&self, id: Uuid) -> impl Future<Output = CoreResult<bool>> + Send;
    fn delete_for_user(&self, user_id: Uuid) -> impl Future<Output = CoreResult<u64>> + Send;
    fn delete_for_user_except(
        &self,
        user_id: Uuid,
        keep: Uuid,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
    fn delete_expired(&self, now: DateTime<Utc>) -> impl Future<Output = CoreResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Login attempts (append-only)
// ---------------------------------------------------------------------------

pub trait LoginAttemptRepository: Send + Sync {
    fn record(
        &self,
        input: CreateLoginAttempt,
    ) -> impl Future<Output = CoreResult<LoginAttempt>> + Send;
    fn count_failures_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
    fn count_failures_by_ip(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
    /// Most recent attempts for an email, newest first.
    fn recent_by_email(
        &self,
        email: &str,
        limit: u64,
    ) -> impl Future<Output = CoreResult<Vec<LoginAttempt>>> + Send;
    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Password reset tokens & password history
// ---------------------------------------------------------------------------

pub trait PasswordResetRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePasswordResetToken,
    ) -> impl Future<Output = CoreResult<PasswordResetToken>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = CoreResult<PasswordResetToken>> + Send;
    /// Flip `used` from false to true. Returns `false` if the token was
    /// already used (or is gone), so only one caller can consume it.
    fn mark_used(&self, id: Uuid) -> impl Future<Output = CoreResult<bool>> + Send;
    fn delete_expired(&self, now: DateTime<Utc>) -> impl Future<Output = CoreResult<u64>> + Send;
}

pub trait PasswordHistoryRepository: Send + Sync {
    fn append(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> impl Future<Output = CoreResult<PasswordHistoryEntry>> + Send;
    /// Most recent entries first.
    fn recent(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> impl Future<Output = CoreResult<Vec<PasswordHistoryEntry>>> + Send;
    /// Delete everything but the `keep` most recent entries.
    fn prune(&self, user_id: Uuid, keep: u64) -> impl Future<Output = CoreResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub event_type: Option<AuditEventType>,
    pub ip_address: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. Entries are never updated.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = CoreResult<AuditLogEntry>> + Send;
    /// Newest first.
    fn search(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = CoreResult<PaginatedResult<AuditLogEntry>>> + Send;
    fn statistics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<AuditStatistics>> + Send;
    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Unit of work
// ---------------------------------------------------------------------------

/// A batch of writes that is applied all-or-nothing.
///
/// Staging methods only record the intended write; nothing reaches the
/// store until [`UnitOfWork::commit`]. Records created through a unit
/// of work get their ids and timestamps at staging time, so the staged
/// value is exactly what will be persisted.
pub trait UnitOfWork: Send {
    fn create_tenant(&mut self, input: CreateTenant) -> Tenant;
    fn create_user(&mut self, input: CreateUser) -> User;
    fn append_password_history(&mut self, user_id: Uuid, password_hash: String);
    fn record_login_attempt(&mut self, input: CreateLoginAttempt);
    /// Delete the user's unused reset tokens and store `input` in their
    /// place. Concurrent replacements for one user leave a single token.
    fn replace_reset_token(&mut self, input: CreatePasswordResetToken);
    /// Same semantics as [`UserRepository::increment_failed_attempts`].
    fn increment_failed_attempts(
        &mut self,
        user_id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    );
    fn is_empty(&self) -> bool;
    /// Apply every staged write in one transaction.
    fn commit(self) -> impl Future<Output = CoreResult<()>> + Send;
    /// Discard every staged write.
    fn rollback(self);
}

/// The full set of repositories a storage backend provides.
pub trait Store: Clone + Send + Sync + 'static {
    type Tenants: TenantRepository;
    type Users: UserRepository;
    type Sessions: SessionRepository;
    type LoginAttempts: LoginAttemptRepository;
    type ResetTokens: PasswordResetRepository;
    type PasswordHistory: PasswordHistoryRepository;
    type AuditLog: AuditLogRepository;
    type Work: UnitOfWork;

    fn tenants(&self) -> &Self::Tenants;
    fn users(&self) -> &Self::Users;
    fn sessions(&self) -> &Self::Sessions;
    fn login_attempts(&self) -> &Self::LoginAttempts;
    fn reset_tokens(&self) -> &Self::ResetTokens;
    fn password_history(&self) -> &Self::PasswordHistory;
    fn audit_log(&self) -> &Self::AuditLog;
    /// Start a new unit of work.
    fn begin(&self) -> Self::Work;
}
