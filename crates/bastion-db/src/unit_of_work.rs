//! All-or-nothing write batches over a SurrealDB transaction.
//!
//! Staged writes are rendered into a single
//! `BEGIN TRANSACTION; ...; COMMIT TRANSACTION;` query. Every statement
//! gets its own bind-parameter prefix (`w0_`, `w1_`, ...) so values never
//! collide across statements. A batch that loses a write conflict to a
//! concurrent transaction is re-run from scratch.

use bastion_core::error::CoreResult;
use bastion_core::models::login_attempt::CreateLoginAttempt;
use bastion_core::models::password_reset::CreatePasswordResetToken;
use bastion_core::models::tenant::{CreateTenant, Tenant};
use bastion_core::models::user::{CreateUser, User};
use bastion_core::repository::UnitOfWork;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, retry_on_conflict};
use crate::repository::increment_failures_sql;

#[derive(Debug, Clone)]
enum StagedWrite {
    CreateTenant(Tenant),
    CreateUser(User),
    AppendPasswordHistory {
        user_id: Uuid,
        password_hash: String,
    },
    RecordLoginAttempt(CreateLoginAttempt),
    IncrementFailedAttempts {
        user_id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    },
    ReplaceResetToken(CreatePasswordResetToken),
}

impl StagedWrite {
    fn statement(&self, p: &str) -> String {
        match self {
            StagedWrite::CreateTenant(_) => format!(
                "CREATE type::record('tenant', ${p}id) SET \
                 name = ${p}name, email = ${p}email, \
                 subdomain = ${p}subdomain, \
                 custom_domain = ${p}custom_domain, \
                 status = ${p}status, \
                 created_at = ${p}created_at, updated_at = ${p}updated_at;"
            ),
            StagedWrite::CreateUser(_) => format!(
                "CREATE type::record('user', ${p}id) SET \
                 tenant_id = ${p}tenant_id, \
                 email = ${p}email, name = ${p}name, \
                 password_hash = ${p}password_hash, \
                 role = ${p}role, \
                 failed_login_attempts = 0, locked_until = NONE, \
                 require_password_change = ${p}require_password_change, \
                 created_at = ${p}created_at, updated_at = ${p}updated_at;"
            ),
            StagedWrite::AppendPasswordHistory { .. } => format!(
                "CREATE type::record('password_history', ${p}id) SET \
                 user_id = ${p}user_id, password_hash = ${p}password_hash;"
            ),
            StagedWrite::RecordLoginAttempt(_) => format!(
                "CREATE type::record('login_attempt', ${p}id) SET \
                 email = ${p}email, ip_address = ${p}ip_address, \
                 success = ${p}success, \
                 failure_reason = ${p}failure_reason, \
                 user_id = ${p}user_id;"
            ),
            StagedWrite::IncrementFailedAttempts { .. } => {
                format!("{};", increment_failures_sql(p))
            }
            // Touching the user row makes two concurrent replacements for
            // the same user conflict, so one of them re-runs and deletes
            // the other's token.
            StagedWrite::ReplaceResetToken(_) => format!(
                "UPDATE type::record('user', ${p}user_id) SET updated_at = time::now();\n\
                 DELETE password_reset_token \
                 WHERE user_id = ${p}user_id AND used = false;\n\
                 CREATE type::record('password_reset_token', ${p}id) SET \
                 user_id = ${p}user_id, email = ${p}email, \
                 token_hash = ${p}token_hash, \
                 expires_at = ${p}expires_at, used = false;"
            ),
        }
    }
}

/// SurrealDB implementation of [`UnitOfWork`].
pub struct SurrealUnitOfWork<C: Connection> {
    db: Surreal<C>,
    writes: Vec<StagedWrite>,
}

impl<C: Connection> SurrealUnitOfWork<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            writes: Vec::new(),
        }
    }

    async fn execute(&self) -> Result<(), DbError> {
        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for (i, write) in self.writes.iter().enumerate() {
            sql.push_str(&write.statement(&format!("w{i}_")));
            sql.push('\n');
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut builder = self.db.query(sql);

        for (i, write) in self.writes.iter().cloned().enumerate() {
            let key = |field: &str| format!("w{i}_{field}");
            match write {
                StagedWrite::CreateTenant(tenant) => {
                    builder = builder
                        .bind((key("id"), tenant.id.to_string()))
                        .bind((key("name"), tenant.name))
                        .bind((key("email"), tenant.email))
                        .bind((key("subdomain"), tenant.subdomain))
                        .bind((key("custom_domain"), tenant.custom_domain))
                        .bind((key("status"), tenant.status.as_str().to_string()))
                        .bind((key("created_at"), tenant.created_at))
                        .bind((key("updated_at"), tenant.updated_at));
                }
                StagedWrite::CreateUser(user) => {
                    builder = builder
                        .bind((key("id"), user.id.to_string()))
                        .bind((key("tenant_id"), user.tenant_id.map(|t| t.to_string())))
                        .bind((key("email"), user.email))
                        .bind((key("name"), user.name))
                        .bind((key("password_hash"), user.password_hash))
                        .bind((key("role"), user.role.as_str().to_string()))
                        .bind((key("require_password_change"), user.require_password_change))
                        .bind((key("created_at"), user.created_at))
                        .bind((key("updated_at"), user.updated_at));
                }
                StagedWrite::AppendPasswordHistory {
                    user_id,
                    password_hash,
                } => {
                    builder = builder
                        .bind((key("id"), Uuid::new_v4().to_string()))
                        .bind((key("user_id"), user_id.to_string()))
                        .bind((key("password_hash"), password_hash));
                }
                StagedWrite::RecordLoginAttempt(attempt) => {
                    builder = builder
                        .bind((key("id"), Uuid::new_v4().to_string()))
                        .bind((key("email"), attempt.email))
                        .bind((key("ip_address"), attempt.ip_address))
                        .bind((key("success"), attempt.success))
                        .bind((
                            key("failure_reason"),
                            attempt.failure_reason.map(|r| r.as_str().to_string()),
                        ))
                        .bind((key("user_id"), attempt.user_id.map(|u| u.to_string())));
                }
                StagedWrite::IncrementFailedAttempts {
                    user_id,
                    max_attempts,
                    lock_until,
                } => {
                    builder = builder
                        .bind((key("id"), user_id.to_string()))
                        .bind((key("max_attempts"), max_attempts))
                        .bind((key("lock_until"), lock_until));
                }
                StagedWrite::ReplaceResetToken(token) => {
                    builder = builder
                        .bind((key("id"), Uuid::new_v4().to_string()))
                        .bind((key("user_id"), token.user_id.to_string()))
                        .bind((key("email"), token.email))
                        .bind((key("token_hash"), token.token_hash))
                        .bind((key("expires_at"), token.expires_at));
                }
            }
        }

        builder
            .await?
            .check()
            .map_err(|e| DbError::Query(format!("transaction rolled back: {e}")))?;
        Ok(())
    }
}

impl<C: Connection> UnitOfWork for SurrealUnitOfWork<C> {
    fn create_tenant(&mut self, input: CreateTenant) -> Tenant {
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            subdomain: input.subdomain,
            custom_domain: input.custom_domain,
            status: input.status,
            created_at: now,
            updated_at: now,
        };
        self.writes.push(StagedWrite::CreateTenant(tenant.clone()));
        tenant
    }

    fn create_user(&mut self, input: CreateUser) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            email: input.email,
            name: input.name,
            password_hash: input.password_hash,
            role: input.role,
            failed_login_attempts: 0,
            locked_until: None,
            require_password_change: input.require_password_change,
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        };
        self.writes.push(StagedWrite::CreateUser(user.clone()));
        user
    }

    fn append_password_history(&mut self, user_id: Uuid, password_hash: String) {
        self.writes.push(StagedWrite::AppendPasswordHistory {
            user_id,
            password_hash,
        });
    }

    fn record_login_attempt(&mut self, input: CreateLoginAttempt) {
        self.writes.push(StagedWrite::RecordLoginAttempt(input));
    }

    fn increment_failed_attempts(
        &mut self,
        user_id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) {
        self.writes.push(StagedWrite::IncrementFailedAttempts {
            user_id,
            max_attempts,
            lock_until,
        });
    }

    fn replace_reset_token(&mut self, input: CreatePasswordResetToken) {
        self.writes.push(StagedWrite::ReplaceResetToken(input));
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    async fn commit(self) -> CoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        retry_on_conflict(|| self.execute()).await?;

        debug!(statements = self.writes.len(), "Committed unit of work");
        Ok(())
    }

    fn rollback(self) {
        debug!(statements = self.writes.len(), "Discarded unit of work");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::models::login_attempt::FailureReason;

    #[test]
    fn statements_use_their_own_prefix() {
        let write = StagedWrite::RecordLoginAttempt(CreateLoginAttempt::failure(
            "a@example.com",
            "10.0.0.1",
            FailureReason::InvalidPassword,
            None,
        ));
        let sql = write.statement("w3_");
        assert!(sql.contains("$w3_email"));
        assert!(sql.contains("$w3_failure_reason"));
        assert!(!sql.contains("$email"));
    }

    #[test]
    fn increment_statement_moves_counter_before_lock() {
        let write = StagedWrite::IncrementFailedAttempts {
            user_id: Uuid::new_v4(),
            max_attempts: 5,
            lock_until: Utc::now(),
        };
        let sql = write.statement("w0_");
        let counter = sql.find("failed_login_attempts = IF").unwrap();
        let lock = sql.find("locked_until = IF").unwrap();
        assert!(counter < lock);
        assert!(sql.contains("$w0_max_attempts"));
    }

    #[test]
    fn reset_token_replacement_touches_the_user_row() {
        let write = StagedWrite::ReplaceResetToken(CreatePasswordResetToken {
            user_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            token_hash: "digest".into(),
            expires_at: Utc::now(),
        });
        let sql = write.statement("w1_");
        let touch = sql.find("UPDATE type::record('user', $w1_user_id)").unwrap();
        let delete = sql.find("DELETE password_reset_token").unwrap();
        let create = sql.find("CREATE type::record('password_reset_token', $w1_id)").unwrap();
        assert!(touch < delete && delete < create);
    }
}
