//! SurrealDB repository implementations.

mod audit;
mod login_attempt;
mod password_history;
mod password_reset;
mod session;
mod tenant;
mod user;

pub use audit::SurrealAuditLogRepository;
pub use login_attempt::SurrealLoginAttemptRepository;
pub use password_history::SurrealPasswordHistoryRepository;
pub use password_reset::SurrealPasswordResetRepository;
pub use session::SurrealSessionRepository;
pub use tenant::SurrealTenantRepository;
pub use user::SurrealUserRepository;

pub(crate) use user::increment_failures_sql;
