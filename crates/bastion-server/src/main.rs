//! Bastion Server: connects the store, applies migrations and runs the
//! retention sweepers until interrupted.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, bail};
use bastion_auth::{AuthConfig, AuthError, Maintenance};
use bastion_db::{DbConfig, DbManager};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bastion", version, about = "Multi-tenant authentication core")]
struct Cli {
    /// SurrealDB WebSocket address.
    #[arg(long, env = "BASTION_DB_URL", default_value = "127.0.0.1:8000")]
    db_url: String,
    #[arg(long, env = "BASTION_DB_NAMESPACE", default_value = "bastion")]
    db_namespace: String,
    #[arg(long, env = "BASTION_DB_DATABASE", default_value = "main")]
    db_database: String,
    #[arg(long, env = "BASTION_DB_USER", default_value = "root")]
    db_user: String,
    #[arg(long, env = "BASTION_DB_PASSWORD", default_value = "root", hide_env_values = true)]
    db_password: String,

    /// HMAC secret for signing tokens.
    #[arg(long, env = "BASTION_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,
    #[arg(long, env = "BASTION_JWT_ISSUER", default_value = "bastion")]
    jwt_issuer: String,
    /// Server-side secret prepended to passwords before hashing.
    #[arg(long, env = "BASTION_PASSWORD_PEPPER", hide_env_values = true)]
    pepper: Option<String>,

    #[arg(long, env = "BASTION_MAX_FAILED_LOGINS", default_value_t = 5)]
    max_failed_logins: u32,
    #[arg(long, env = "BASTION_LOCKOUT_SECS", default_value_t = 1800)]
    lockout_secs: u64,
    /// Sliding window for per-email and per-address failure counts.
    #[arg(long, env = "BASTION_RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    rate_limit_window_secs: u64,
    #[arg(long, env = "BASTION_MAX_FAILURES_PER_EMAIL", default_value_t = 5)]
    max_failures_per_email: u64,
    #[arg(long, env = "BASTION_MAX_FAILURES_PER_ADDRESS", default_value_t = 10)]
    max_failures_per_address: u64,

    #[arg(long, env = "BASTION_ACCESS_TOKEN_SECS", default_value_t = 900)]
    access_token_secs: u64,
    #[arg(long, env = "BASTION_REFRESH_TOKEN_SECS", default_value_t = 604_800)]
    refresh_token_secs: u64,
    /// Refresh token lifetime for remember-me logins.
    #[arg(long, env = "BASTION_REMEMBER_ME_SECS", default_value_t = 2_592_000)]
    remember_me_secs: u64,
    #[arg(long, env = "BASTION_RESET_TOKEN_SECS", default_value_t = 3600)]
    reset_token_secs: u64,
    #[arg(long, env = "BASTION_SESSION_IDLE_MINS", default_value_t = 30)]
    session_idle_mins: i64,
    /// Previous password hashes kept per user.
    #[arg(long, env = "BASTION_PASSWORD_HISTORY_DEPTH", default_value_t = 5)]
    password_history_depth: u64,

    #[arg(long, env = "BASTION_ARGON2_MEMORY_KIB", default_value_t = 19_456)]
    argon2_memory_kib: u32,
    #[arg(long, env = "BASTION_ARGON2_ITERATIONS", default_value_t = 2)]
    argon2_iterations: u32,
    #[arg(long, env = "BASTION_ARGON2_PARALLELISM", default_value_t = 1)]
    argon2_parallelism: u32,

    #[arg(long, env = "BASTION_ATTEMPT_RETENTION_DAYS", default_value_t = 30)]
    attempt_retention_days: i64,
    #[arg(long, env = "BASTION_AUDIT_RETENTION_DAYS", default_value_t = 90)]
    audit_retention_days: i64,

    /// Seconds between login attempt sweeps.
    #[arg(long, env = "BASTION_ATTEMPT_SWEEP_SECS", default_value_t = 3600)]
    attempt_sweep_secs: u64,
    /// Seconds between audit log purges.
    #[arg(long, env = "BASTION_AUDIT_SWEEP_SECS", default_value_t = 86_400)]
    audit_sweep_secs: u64,
    /// Seconds between expired session sweeps.
    #[arg(long, env = "BASTION_SESSION_SWEEP_SECS", default_value_t = 900)]
    session_sweep_secs: u64,
    /// Seconds between expired reset token sweeps.
    #[arg(long, env = "BASTION_RESET_SWEEP_SECS", default_value_t = 3600)]
    reset_sweep_secs: u64,
}

impl Cli {
    fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_user.clone(),
            password: self.db_password.clone(),
        }
    }

    fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        if self.jwt_secret.len() < 32 {
            bail!("BASTION_JWT_SECRET must be at least 32 bytes");
        }
        Ok(AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            jwt_issuer: self.jwt_issuer.clone(),
            access_token_lifetime_secs: self.access_token_secs,
            refresh_token_lifetime_secs: self.refresh_token_secs,
            remember_me_lifetime_secs: self.remember_me_secs,
            max_failed_login_attempts: self.max_failed_logins,
            lockout_duration_secs: self.lockout_secs,
            rate_limit_window_secs: self.rate_limit_window_secs,
            max_failures_per_email: self.max_failures_per_email,
            max_failures_per_address: self.max_failures_per_address,
            login_attempt_retention_days: self.attempt_retention_days,
            reset_token_lifetime_secs: self.reset_token_secs,
            password_history_depth: self.password_history_depth,
            audit_retention_days: self.audit_retention_days,
            session_idle_timeout_mins: self.session_idle_mins,
            pepper: self.pepper.clone(),
            argon2_memory_kib: self.argon2_memory_kib,
            argon2_iterations: self.argon2_iterations,
            argon2_parallelism: self.argon2_parallelism,
        })
    }
}

/// Run `sweep` every `every`, logging the outcome. The first run
/// happens one full period after start.
fn spawn_sweeper<F, Fut>(name: &'static str, every: Duration, sweep: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64, AuthError>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep().await {
                Ok(removed) => debug!(sweeper = name, removed, "Sweep finished"),
                Err(e) => error!(sweeper = name, error = %e, "Sweep failed"),
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bastion=info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let auth_config = cli.auth_config()?;

    info!("Starting Bastion server...");

    let db = DbManager::connect(&cli.db_config())
        .await
        .context("connecting to SurrealDB")?;
    db.migrate().await.context("applying schema migrations")?;

    let maintenance = Maintenance::new(db.store(), auth_config);

    let sweepers = vec![
        spawn_sweeper("login_attempts", Duration::from_secs(cli.attempt_sweep_secs), {
            let m = maintenance.clone();
            move || {
                let m = m.clone();
                async move { m.sweep_login_attempts().await }
            }
        }),
        spawn_sweeper("audit_log", Duration::from_secs(cli.audit_sweep_secs), {
            let m = maintenance.clone();
            move || {
                let m = m.clone();
                async move { m.sweep_audit_log().await }
            }
        }),
        spawn_sweeper("sessions", Duration::from_secs(cli.session_sweep_secs), {
            let m = maintenance.clone();
            move || {
                let m = m.clone();
                async move { m.sweep_sessions().await }
            }
        }),
        spawn_sweeper("reset_tokens", Duration::from_secs(cli.reset_sweep_secs), {
            let m = maintenance.clone();
            move || {
                let m = m.clone();
                async move { m.sweep_reset_tokens().await }
            }
        }),
    ];

    info!(sweepers = sweepers.len(), "Bastion server ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown requested");
    for handle in sweepers {
        handle.abort();
    }

    info!("Bastion server stopped.");
    Ok(())
}
