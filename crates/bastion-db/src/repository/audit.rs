//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! Audit log entries are append-only. The schema denies UPDATE on the
//! table; deletes only happen through the retention sweep.

use std::collections::HashMap;

use bastion_core::error::CoreResult;
use bastion_core::models::audit::{
    AuditEventType, AuditLogEntry, AuditStatistics, CreateAuditLogEntry,
};
use bastion_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid, retry_on_conflict};

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    event_type: String,
    user_id: Option<String>,
    tenant_id: Option<String>,
    ip_address: String,
    user_agent: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

fn parse_event_type(s: &str) -> Result<AuditEventType, DbError> {
    AuditEventType::parse(s).ok_or_else(|| DbError::Decode(format!("unknown audit event: {s}")))
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid("audit_log", &self.record_id)?,
            event_type: parse_event_type(&self.event_type)?,
            user_id: parse_opt_uuid("user", self.user_id)?,
            tenant_id: parse_opt_uuid("tenant", self.tenant_id)?,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

/// Enough of a deleted row to count it.
#[derive(Debug, SurrealValue)]
struct DeletedAuditRow {
    #[allow(dead_code)]
    event_type: String,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct EventCountRow {
    event_type: String,
    total: u64,
}

/// SurrealDB implementation of the audit log repository.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> CoreResult<AuditLogEntry> {
        let id_str = Uuid::new_v4().to_string();
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 event_type = $event_type, \
                 user_id = $user_id, tenant_id = $tenant_id, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 metadata = $metadata; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('audit_log', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("event_type", input.event_type.as_str().to_string()))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("metadata", metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<AuditRow> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_log".into(),
            id: id_str,
        })?;

        Ok(row.try_into_entry()?)
    }

    async fn search(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> CoreResult<PaginatedResult<AuditLogEntry>> {
        let mut conditions = Vec::new();
        if filter.user_id.is_some() {
            conditions.push("user_id = $user_id");
        }
        if filter.event_type.is_some() {
            conditions.push("event_type = $event_type");
        }
        if filter.ip_address.is_some() {
            conditions.push("ip_address = $ip_address");
        }
        if filter.from.is_some() {
            conditions.push("created_at >= $from");
        }
        if filter.to.is_some() {
            conditions.push("created_at <= $to");
        }
        let where_clause = if conditions.is_empty() {
            "true".to_string()
        } else {
            conditions.join(" AND ")
        };

        let query = format!(
            "SELECT count() AS total FROM audit_log WHERE {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_log \
             WHERE {where_clause} \
             ORDER BY created_at DESC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));

        if let Some(user_id) = filter.user_id {
            builder = builder.bind(("user_id", user_id.to_string()));
        }
        if let Some(event_type) = filter.event_type {
            builder = builder.bind(("event_type", event_type.as_str().to_string()));
        }
        if let Some(ip_address) = filter.ip_address {
            builder = builder.bind(("ip_address", ip_address));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<AuditRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn statistics(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<AuditStatistics> {
        let result = self
            .db
            .query(
                "SELECT event_type, count() AS total FROM audit_log \
                 WHERE created_at >= $from AND created_at <= $to \
                 GROUP BY event_type; \
                 SELECT count() AS total FROM (\
                     SELECT user_id FROM audit_log \
                     WHERE created_at >= $from AND created_at <= $to \
                     AND user_id != NONE GROUP BY user_id\
                 ) GROUP ALL; \
                 SELECT count() AS total FROM (\
                     SELECT ip_address FROM audit_log \
                     WHERE created_at >= $from AND created_at <= $to \
                     GROUP BY ip_address\
                 ) GROUP ALL;",
            )
            .bind(("from", from))
            .bind(("to", to))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let by_type: Vec<EventCountRow> = result.take(0).map_err(DbError::from)?;
        let users: Vec<CountRow> = result.take(1).map_err(DbError::from)?;
        let addresses: Vec<CountRow> = result.take(2).map_err(DbError::from)?;

        let mut events_by_type = HashMap::new();
        for row in by_type {
            events_by_type.insert(parse_event_type(&row.event_type)?, row.total);
        }

        Ok(AuditStatistics {
            events_by_type,
            distinct_users: users.first().map(|r| r.total).unwrap_or(0),
            distinct_addresses: addresses.first().map(|r| r.total).unwrap_or(0),
        })
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let rows: Vec<DeletedAuditRow> = retry_on_conflict(|| async {
            let result = self
                .db
                .query("DELETE audit_log WHERE created_at < $cutoff RETURN BEFORE")
                .bind(("cutoff", cutoff))
                .await?;
            let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
            Ok(result.take(0)?)
        })
        .await?;
        Ok(rows.len() as u64)
    }
}
