//! SurrealDB implementation of [`PasswordHistoryRepository`].

use bastion_core::error::CoreResult;
use bastion_core::models::password_history::PasswordHistoryEntry;
use bastion_core::repository::PasswordHistoryRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct HistoryRow {
    record_id: String,
    user_id: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn try_into_entry(self) -> Result<PasswordHistoryEntry, DbError> {
        Ok(PasswordHistoryEntry {
            id: parse_uuid("password_history", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            password_hash: self.password_hash,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the password history store.
#[derive(Clone)]
pub struct SurrealPasswordHistoryRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPasswordHistoryRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PasswordHistoryRepository for SurrealPasswordHistoryRepository<C> {
    async fn append(&self, user_id: Uuid, password_hash: String) -> CoreResult<PasswordHistoryEntry> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('password_history', $id) SET \
                 user_id = $user_id, password_hash = $password_hash; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('password_history', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", user_id.to_string()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<HistoryRow> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "password_history".into(),
            id: id_str,
        })?;

        Ok(row.try_into_entry()?)
    }

    async fn recent(&self, user_id: Uuid, limit: u64) -> CoreResult<Vec<PasswordHistoryEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM password_history \
                 WHERE user_id = $user_id \
                 ORDER BY created_at DESC LIMIT $limit",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HistoryRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_entry().map_err(Into::into))
            .collect()
    }

    async fn prune(&self, user_id: Uuid, keep: u64) -> CoreResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM password_history \
                 WHERE user_id = $user_id \
                 ORDER BY created_at DESC LIMIT 1000 START $keep",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("keep", keep))
            .await
            .map_err(DbError::from)?;

        let stale: Vec<HistoryRow> = result.take(0).map_err(DbError::from)?;
        for row in &stale {
            self.db
                .query("DELETE type::record('password_history', $id)")
                .bind(("id", row.record_id.clone()))
                .await
                .map_err(DbError::from)?
                .check()
                .map_err(|e| DbError::Query(e.to_string()))?;
        }

        Ok(stale.len() as u64)
    }
}
