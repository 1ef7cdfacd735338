//! SurrealDB implementation of [`PasswordResetRepository`].

use bastion_core::error::CoreResult;
use bastion_core::models::password_reset::{CreatePasswordResetToken, PasswordResetToken};
use bastion_core::repository::PasswordResetRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid, retry_on_conflict};

#[derive(Debug, SurrealValue)]
struct ResetTokenRow {
    user_id: String,
    email: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used: bool,
    created_at: DateTime<Utc>,
}

impl ResetTokenRow {
    fn into_token(self, id: Uuid) -> Result<PasswordResetToken, DbError> {
        Ok(PasswordResetToken {
            id,
            user_id: parse_uuid("user", &self.user_id)?,
            email: self.email,
            token_hash: self.token_hash,
            expires_at: self.expires_at,
            used: self.used,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct ResetTokenRowWithId {
    record_id: String,
    user_id: String,
    email: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used: bool,
    created_at: DateTime<Utc>,
}

/// SurrealDB implementation of the password reset token store.
#[derive(Clone)]
pub struct SurrealPasswordResetRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPasswordResetRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PasswordResetRepository for SurrealPasswordResetRepository<C> {
    async fn create(&self, input: CreatePasswordResetToken) -> CoreResult<PasswordResetToken> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('password_reset_token', $id) SET \
                 user_id = $user_id, email = $email, \
                 token_hash = $token_hash, \
                 expires_at = $expires_at, used = false",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("email", input.email))
            .bind(("token_hash", input.token_hash))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<ResetTokenRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "password_reset_token".into(),
            id: id_str,
        })?;

        Ok(row.into_token(id)?)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> CoreResult<PasswordResetToken> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM password_reset_token \
                 WHERE token_hash = $token_hash LIMIT 1",
            )
            .bind(("token_hash", token_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResetTokenRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "password_reset_token".into(),
            id: "token_hash".into(),
        })?;

        let id = parse_uuid("password_reset_token", &row.record_id)?;
        let token = ResetTokenRow {
            user_id: row.user_id,
            email: row.email,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            used: row.used,
            created_at: row.created_at,
        }
        .into_token(id)?;

        Ok(token)
    }

    async fn mark_used(&self, id: Uuid) -> CoreResult<bool> {
        let result = self
            .db
            .query(
                "UPDATE type::record('password_reset_token', $id) \
                 SET used = true WHERE used = false",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<ResetTokenRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let rows: Vec<ResetTokenRow> = retry_on_conflict(|| async {
            let result = self
                .db
                .query("DELETE password_reset_token WHERE expires_at <= $now RETURN BEFORE")
                .bind(("now", now))
                .await?;
            let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
            Ok(result.take(0)?)
        })
        .await?;
        Ok(rows.len() as u64)
    }
}
