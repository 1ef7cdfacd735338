//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings; enums are stored as strings with ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "authentication_core",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenants
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD email ON TABLE tenant TYPE string;
DEFINE FIELD subdomain ON TABLE tenant TYPE string;
DEFINE FIELD custom_domain ON TABLE tenant TYPE option<string>;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['PendingVerification', 'Active', 'Suspended', \
    'Deactivated'];
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_subdomain ON TABLE tenant \
    COLUMNS subdomain UNIQUE;
DEFINE INDEX idx_tenant_email ON TABLE tenant COLUMNS email UNIQUE;
DEFINE INDEX idx_tenant_custom_domain ON TABLE tenant \
    COLUMNS custom_domain;

-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE user TYPE option<string>;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD name ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['PlatformAdmin', 'TenantAdmin', 'Member'];
DEFINE FIELD failed_login_attempts ON TABLE user TYPE int DEFAULT 0;
DEFINE FIELD locked_until ON TABLE user TYPE option<datetime>;
DEFINE FIELD require_password_change ON TABLE user TYPE bool \
    DEFAULT false;
DEFINE FIELD last_login_at ON TABLE user TYPE option<datetime>;
DEFINE FIELD last_login_ip ON TABLE user TYPE option<string>;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;
DEFINE INDEX idx_user_tenant ON TABLE user COLUMNS tenant_id;

-- =======================================================================
-- Sessions
-- =======================================================================
DEFINE TABLE session SCHEMAFULL;
DEFINE FIELD user_id ON TABLE session TYPE string;
DEFINE FIELD token_hash ON TABLE session TYPE string;
DEFINE FIELD ip_address ON TABLE session TYPE option<string>;
DEFINE FIELD user_agent ON TABLE session TYPE option<string>;
DEFINE FIELD created_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD last_activity_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE session TYPE datetime;
DEFINE INDEX idx_session_token ON TABLE session \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_session_user ON TABLE session COLUMNS user_id;

-- =======================================================================
-- Login attempts (append-only)
-- =======================================================================
DEFINE TABLE login_attempt SCHEMAFULL;
DEFINE FIELD email ON TABLE login_attempt TYPE string;
DEFINE FIELD ip_address ON TABLE login_attempt TYPE string;
DEFINE FIELD success ON TABLE login_attempt TYPE bool;
DEFINE FIELD failure_reason ON TABLE login_attempt TYPE option<string>;
DEFINE FIELD user_id ON TABLE login_attempt TYPE option<string>;
DEFINE FIELD attempted_at ON TABLE login_attempt TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_attempt_email_time ON TABLE login_attempt \
    COLUMNS email, attempted_at;
DEFINE INDEX idx_attempt_ip_time ON TABLE login_attempt \
    COLUMNS ip_address, attempted_at;

-- =======================================================================
-- Password reset tokens
-- =======================================================================
DEFINE TABLE password_reset_token SCHEMAFULL;
DEFINE FIELD user_id ON TABLE password_reset_token TYPE string;
DEFINE FIELD email ON TABLE password_reset_token TYPE string;
DEFINE FIELD token_hash ON TABLE password_reset_token TYPE string;
DEFINE FIELD expires_at ON TABLE password_reset_token TYPE datetime;
DEFINE FIELD used ON TABLE password_reset_token TYPE bool \
    DEFAULT false;
DEFINE FIELD created_at ON TABLE password_reset_token TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_reset_token_hash ON TABLE password_reset_token \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_reset_token_user ON TABLE password_reset_token \
    COLUMNS user_id;

-- =======================================================================
-- Password history
-- =======================================================================
DEFINE TABLE password_history SCHEMAFULL;
DEFINE FIELD user_id ON TABLE password_history TYPE string;
DEFINE FIELD password_hash ON TABLE password_history TYPE string;
DEFINE FIELD created_at ON TABLE password_history TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_password_history_user ON TABLE password_history \
    COLUMNS user_id, created_at;

-- =======================================================================
-- Audit log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete FULL;
DEFINE FIELD event_type ON TABLE audit_log TYPE string \
    ASSERT $value IN ['LOGIN_SUCCESS', 'LOGIN_FAILED', 'LOGOUT', \
    'TOKEN_REFRESH', 'PASSWORD_CHANGED', 'PASSWORD_RESET_REQUESTED', \
    'PASSWORD_RESET_COMPLETED', 'ACCOUNT_LOCKED', 'ACCOUNT_UNLOCKED', \
    'SESSION_REVOKED', 'USER_CREATED', 'TENANT_APPROVED', \
    'TENANT_REJECTED'];
DEFINE FIELD user_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD tenant_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD ip_address ON TABLE audit_log TYPE string;
DEFINE FIELD user_agent ON TABLE audit_log TYPE option<string>;
DEFINE FIELD metadata ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD created_at ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_time ON TABLE audit_log COLUMNS created_at;
DEFINE INDEX idx_audit_user ON TABLE audit_log COLUMNS user_id;
DEFINE INDEX idx_audit_ip ON TABLE audit_log COLUMNS ip_address;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "failed to record v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::models::audit::AuditEventType;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(window[0].version < window[1].version);
        }
    }

    #[test]
    fn audit_assert_lists_every_event_type() {
        for event in AuditEventType::ALL {
            assert!(
                SCHEMA_V1.contains(&format!("'{}'", event.as_str())),
                "schema is missing {}",
                event.as_str()
            );
        }
    }
}
