//! SurrealDB implementation of [`TenantRepository`].

use bastion_core::error::CoreResult;
use bastion_core::models::tenant::{CreateTenant, Tenant, TenantStatus};
use bastion_core::repository::TenantRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct TenantRow {
    name: String,
    email: String,
    subdomain: String,
    custom_domain: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRow {
    fn into_tenant(self, id: Uuid) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id,
            name: self.name,
            email: self.email,
            subdomain: self.subdomain,
            custom_domain: self.custom_domain,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct TenantRowWithId {
    record_id: String,
    name: String,
    email: String,
    subdomain: String,
    custom_domain: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRowWithId {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id: parse_uuid("tenant", &self.record_id)?,
            name: self.name,
            email: self.email,
            subdomain: self.subdomain,
            custom_domain: self.custom_domain,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_status(s: &str) -> Result<TenantStatus, DbError> {
    TenantStatus::parse(s).ok_or_else(|| DbError::Decode(format!("unknown tenant status: {s}")))
}

/// SurrealDB implementation of the Tenant repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_one(
        &self,
        clause: &'static str,
        value: String,
        label: &str,
    ) -> CoreResult<Tenant> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM tenant WHERE {clause} LIMIT 1"
        );
        let mut result = self
            .db
            .query(query)
            .bind(("value", value.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: format!("{label}={value}"),
        })?;

        Ok(row.try_into_tenant()?)
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> CoreResult<Tenant> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('tenant', $id) SET \
                 name = $name, email = $email, \
                 subdomain = $subdomain, \
                 custom_domain = $custom_domain, \
                 status = $status",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("email", input.email))
            .bind(("subdomain", input.subdomain))
            .bind(("custom_domain", input.custom_domain))
            .bind(("status", input.status.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> CoreResult<Tenant> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('tenant', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn get_by_subdomain(&self, subdomain: &str) -> CoreResult<Tenant> {
        self.find_one("subdomain = $value", subdomain.to_string(), "subdomain")
            .await
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<Tenant> {
        self.find_one("email = $value", email.to_string(), "email")
            .await
    }

    async fn get_by_identifier(&self, identifier: &str) -> CoreResult<Tenant> {
        self.find_one(
            "subdomain = $value OR custom_domain = $value",
            identifier.to_string(),
            "identifier",
        )
        .await
    }

    async fn subdomain_exists(&self, subdomain: &str) -> CoreResult<bool> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM tenant WHERE subdomain = $subdomain GROUP ALL")
            .bind(("subdomain", subdomain.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: TenantStatus,
        to: TenantStatus,
    ) -> CoreResult<Option<Tenant>> {
        let result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 status = $to, updated_at = time::now() \
                 WHERE status = $from",
            )
            .bind(("id", id.to_string()))
            .bind(("from", from.as_str().to_string()))
            .bind(("to", to.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.into_tenant(id)?)),
            None => Ok(None),
        }
    }
}
