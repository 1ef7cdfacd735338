//! Database-specific error types and conversions.

use std::future::Future;
use std::time::Duration;

use bastion_core::error::CoreError;
use tracing::debug;

/// Attempts made for a write that keeps losing optimistic-concurrency
/// races before the conflict is surfaced.
pub(crate) const CONFLICT_ATTEMPTS: u32 = 10;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DbError {
    /// True when SurrealDB aborted the transaction because a concurrent
    /// one touched the same keys. Such a transaction can be re-run as is.
    pub fn is_conflict(&self) -> bool {
        let message = self.to_string();
        message.contains("read or write conflict") || message.contains("can be retried")
    }
}

/// Run `op` until it succeeds, fails with anything other than a write
/// conflict, or [`CONFLICT_ATTEMPTS`] is reached.
pub(crate) async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < CONFLICT_ATTEMPTS => {
                debug!(attempt, "Write conflict, retrying");
                tokio::time::sleep(Duration::from_millis(2 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            other => CoreError::Database(other.to_string()),
        }
    }
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(
    field: &str,
    raw: Option<String>,
) -> Result<Option<uuid::Uuid>, DbError> {
    raw.map(|s| parse_uuid(field, &s)).transpose()
}
