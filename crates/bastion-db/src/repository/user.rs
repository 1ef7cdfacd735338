//! SurrealDB implementation of [`UserRepository`].
//!
//! Password hashes arrive pre-computed from the auth layer; this module
//! only stores them. The failure counter and the lockout timestamp are
//! always written by a single statement so they can never disagree.

use bastion_core::error::CoreResult;
use bastion_core::models::user::{CreateUser, User, UserRole};
use bastion_core::repository::UserRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid, retry_on_conflict};

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    tenant_id: Option<String>,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    failed_login_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    require_password_change: bool,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    tenant_id: Option<String>,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    failed_login_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    require_password_change: bool,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_role(s: &str) -> Result<UserRole, DbError> {
    UserRole::parse(s).ok_or_else(|| DbError::Decode(format!("unknown user role: {s}")))
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            tenant_id: parse_opt_uuid("tenant", self.tenant_id)?,
            email: self.email,
            name: self.name,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
            require_password_change: self.require_password_change,
            last_login_at: self.last_login_at,
            last_login_ip: self.last_login_ip,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = parse_uuid("user", &self.record_id)?;
        Ok(User {
            id,
            tenant_id: parse_opt_uuid("tenant", self.tenant_id)?,
            email: self.email,
            name: self.name,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
            require_password_change: self.require_password_change,
            last_login_at: self.last_login_at,
            last_login_ip: self.last_login_ip,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// The failed-login increment as one statement. `prefix` namespaces the
/// bind parameters so the statement can sit inside a larger transaction.
///
/// A lock that has already lapsed no longer counts: the counter restarts
/// at one and the stale timestamp is dropped. Assignments apply in
/// order, so `locked_until` sees the new counter.
pub(crate) fn increment_failures_sql(prefix: &str) -> String {
    format!(
        "UPDATE type::record('user', ${prefix}id) SET \
         failed_login_attempts = IF locked_until != NONE AND locked_until <= time::now() \
         THEN 1 ELSE failed_login_attempts + 1 END, \
         locked_until = IF failed_login_attempts >= ${prefix}max_attempts \
         THEN ${prefix}lock_until \
         ELSE IF locked_until != NONE AND locked_until <= time::now() THEN NONE \
         ELSE locked_until END, \
         updated_at = time::now() \
         RETURN AFTER"
    )
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> CoreResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 tenant_id = $tenant_id, \
                 email = $email, name = $name, \
                 password_hash = $password_hash, \
                 role = $role, \
                 failed_login_attempts = 0, \
                 locked_until = NONE, \
                 require_password_change = $require_password_change",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("email", input.email))
            .bind(("name", input.name))
            .bind(("password_hash", input.password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("require_password_change", input.require_password_change))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> CoreResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<User> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM user WHERE email = $email LIMIT 1")
            .bind(("email", email.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: format!("email={email}"),
        })?;

        Ok(row.try_into_user()?)
    }

    async fn increment_failed_attempts(
        &self,
        id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> CoreResult<User> {
        let id_str = id.to_string();

        let rows: Vec<UserRow> = retry_on_conflict(|| async {
            let result = self
                .db
                .query(increment_failures_sql(""))
                .bind(("id", id_str.clone()))
                .bind(("max_attempts", max_attempts))
                .bind(("lock_until", lock_until))
                .await?;
            let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
            Ok(result.take(0)?)
        })
        .await?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn clear_failed_attempts(&self, id: Uuid) -> CoreResult<()> {
        retry_on_conflict(|| async {
            self.db
                .query(
                    "UPDATE type::record('user', $id) SET \
                     failed_login_attempts = 0, locked_until = NONE, \
                     updated_at = time::now()",
                )
                .bind(("id", id.to_string()))
                .await?
                .check()
                .map_err(|e| DbError::Query(e.to_string()))?;
            Ok(())
        })
        .await?;

        Ok(())
    }

    async fn clear_expired_lockout(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<bool> {
        let rows: Vec<UserRow> = retry_on_conflict(|| async {
            let result = self
                .db
                .query(
                    "UPDATE type::record('user', $id) SET \
                     failed_login_attempts = 0, locked_until = NONE, \
                     updated_at = time::now() \
                     WHERE locked_until != NONE AND locked_until <= $now",
                )
                .bind(("id", id.to_string()))
                .bind(("now", now))
                .await?;
            let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
            Ok(result.take(0)?)
        })
        .await?;
        Ok(!rows.is_empty())
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> CoreResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 password_hash = $password_hash, \
                 require_password_change = false, \
                 updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>, ip_address: String) -> CoreResult<()> {
        self.db
            .query(
                "UPDATE type::record('user', $id) SET \
                 last_login_at = $at, last_login_ip = $ip, \
                 updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("at", at))
            .bind(("ip", ip_address))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }
}
