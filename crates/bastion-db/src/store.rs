//! [`Store`] implementation bundling every SurrealDB repository over
//! one connection.

use bastion_core::repository::Store;
use surrealdb::{Connection, Surreal};

use crate::repository::{
    SurrealAuditLogRepository, SurrealLoginAttemptRepository, SurrealPasswordHistoryRepository,
    SurrealPasswordResetRepository, SurrealSessionRepository, SurrealTenantRepository,
    SurrealUserRepository,
};
use crate::unit_of_work::SurrealUnitOfWork;

pub struct SurrealStore<C: Connection> {
    db: Surreal<C>,
    tenants: SurrealTenantRepository<C>,
    users: SurrealUserRepository<C>,
    sessions: SurrealSessionRepository<C>,
    login_attempts: SurrealLoginAttemptRepository<C>,
    reset_tokens: SurrealPasswordResetRepository<C>,
    password_history: SurrealPasswordHistoryRepository<C>,
    audit_log: SurrealAuditLogRepository<C>,
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            tenants: SurrealTenantRepository::new(db.clone()),
            users: SurrealUserRepository::new(db.clone()),
            sessions: SurrealSessionRepository::new(db.clone()),
            login_attempts: SurrealLoginAttemptRepository::new(db.clone()),
            reset_tokens: SurrealPasswordResetRepository::new(db.clone()),
            password_history: SurrealPasswordHistoryRepository::new(db.clone()),
            audit_log: SurrealAuditLogRepository::new(db.clone()),
            db,
        }
    }

    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }
}

// Written by hand so `C` itself need not be `Clone`.
impl<C: Connection> Clone for SurrealStore<C> {
    fn clone(&self) -> Self {
        Self::new(self.db.clone())
    }
}

impl<C: Connection> Store for SurrealStore<C> {
    type Tenants = SurrealTenantRepository<C>;
    type Users = SurrealUserRepository<C>;
    type Sessions = SurrealSessionRepository<C>;
    type LoginAttempts = SurrealLoginAttemptRepository<C>;
    type ResetTokens = SurrealPasswordResetRepository<C>;
    type PasswordHistory = SurrealPasswordHistoryRepository<C>;
    type AuditLog = SurrealAuditLogRepository<C>;
    type Work = SurrealUnitOfWork<C>;

    fn tenants(&self) -> &Self::Tenants {
        &self.tenants
    }

    fn users(&self) -> &Self::Users {
        &self.users
    }

    fn sessions(&self) -> &Self::Sessions {
        &self.sessions
    }

    fn login_attempts(&self) -> &Self::LoginAttempts {
        &self.login_attempts
    }

    fn reset_tokens(&self) -> &Self::ResetTokens {
        &self.reset_tokens
    }

    fn password_history(&self) -> &Self::PasswordHistory {
        &self.password_history
    }

    fn audit_log(&self) -> &Self::AuditLog {
        &self.audit_log
    }

    fn begin(&self) -> Self::Work {
        SurrealUnitOfWork::new(self.db.clone())
    }
}
