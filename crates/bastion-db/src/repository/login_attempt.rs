//! SurrealDB implementation of [`LoginAttemptRepository`].
//!
//! The ledger is append-only; rows leave only through the retention
//! sweep.

use bastion_core::error::CoreResult;
use bastion_core::models::login_attempt::{CreateLoginAttempt, FailureReason, LoginAttempt};
use bastion_core::repository::LoginAttemptRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid, retry_on_conflict};

#[derive(Debug, SurrealValue)]
struct LoginAttemptRow {
    record_id: String,
    email: String,
    ip_address: String,
    success: bool,
    failure_reason: Option<String>,
    user_id: Option<String>,
    attempted_at: DateTime<Utc>,
}

impl LoginAttemptRow {
    fn try_into_attempt(self) -> Result<LoginAttempt, DbError> {
        let failure_reason = self
            .failure_reason
            .map(|raw| {
                FailureReason::parse(&raw)
                    .ok_or_else(|| DbError::Decode(format!("unknown failure reason: {raw}")))
            })
            .transpose()?;

        Ok(LoginAttempt {
            id: parse_uuid("login_attempt", &self.record_id)?,
            email: self.email,
            ip_address: self.ip_address,
            success: self.success,
            failure_reason,
            user_id: parse_opt_uuid("user", self.user_id)?,
            attempted_at: self.attempted_at,
        })
    }
}

/// Enough of a deleted row to count it.
#[derive(Debug, SurrealValue)]
struct DeletedAttemptRow {
    #[allow(dead_code)]
    email: String,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the login attempt ledger.
#[derive(Clone)]
pub struct SurrealLoginAttemptRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealLoginAttemptRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn count_failures(
        &self,
        column: &'static str,
        value: &str,
        since: DateTime<Utc>,
    ) -> CoreResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM login_attempt \
             WHERE {column} = $value AND success = false \
             AND attempted_at > $since GROUP ALL"
        );
        let mut result = self
            .db
            .query(query)
            .bind(("value", value.to_string()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

impl<C: Connection> LoginAttemptRepository for SurrealLoginAttemptRepository<C> {
    async fn record(&self, input: CreateLoginAttempt) -> CoreResult<LoginAttempt> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('login_attempt', $id) SET \
                 email = $email, ip_address = $ip_address, \
                 success = $success, \
                 failure_reason = $failure_reason, \
                 user_id = $user_id; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('login_attempt', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", input.email))
            .bind(("ip_address", input.ip_address))
            .bind(("success", input.success))
            .bind(("failure_reason", input.failure_reason.map(|r| r.as_str().to_string())))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        // Statement 0 is the CREATE, statement 1 reads it back with its id.
        let rows: Vec<LoginAttemptRow> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "login_attempt".into(),
            id: id_str,
        })?;

        Ok(row.try_into_attempt()?)
    }

    async fn count_failures_by_email(&self, email: &str, since: DateTime<Utc>) -> CoreResult<u64> {
        self.count_failures("email", email, since).await
    }

    async fn count_failures_by_ip(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> CoreResult<u64> {
        self.count_failures("ip_address", ip_address, since).await
    }

    async fn recent_by_email(&self, email: &str, limit: u64) -> CoreResult<Vec<LoginAttempt>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM login_attempt \
                 WHERE email = $email \
                 ORDER BY attempted_at DESC LIMIT $limit",
            )
            .bind(("email", email.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<LoginAttemptRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_attempt().map_err(Into::into))
            .collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        // Concurrent sweeps may race on the same rows; the loser re-runs
        // and only counts what it removed itself.
        let rows: Vec<DeletedAttemptRow> = retry_on_conflict(|| async {
            let result = self
                .db
                .query("DELETE login_attempt WHERE attempted_at < $cutoff RETURN BEFORE")
                .bind(("cutoff", cutoff))
                .await?;
            let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
            Ok(result.take(0)?)
        })
        .await?;
        Ok(rows.len() as u64)
    }
}
