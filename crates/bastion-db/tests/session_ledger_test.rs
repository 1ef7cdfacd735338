//! Integration tests for sessions, the login attempt ledger, reset
//! tokens, password history and the audit log.

use bastion_core::models::audit::{AuditEventType, CreateAuditLogEntry};
use bastion_core::models::login_attempt::{CreateLoginAttempt, FailureReason};
use bastion_core::models::password_reset::CreatePasswordResetToken;
use bastion_core::models::session::CreateSession;
use bastion_core::repository::{
    AuditLogFilter, AuditLogRepository, LoginAttemptRepository, Pagination,
    PasswordHistoryRepository, PasswordResetRepository, SessionRepository,
};
use bastion_db::repository::{
    SurrealAuditLogRepository, SurrealLoginAttemptRepository, SurrealPasswordHistoryRepository,
    SurrealPasswordResetRepository, SurrealSessionRepository,
};
use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    bastion_db::run_migrations(&db).await.unwrap();
    db
}

fn session_for(user_id: Uuid, token_hash: &str, ttl: Duration) -> CreateSession {
    CreateSession {
        user_id,
        token_hash: token_hash.into(),
        ip_address: Some("10.0.0.1".into()),
        user_agent: Some("test-agent".into()),
        expires_at: Utc::now() + ttl,
    }
}

// -----------------------------------------------------------------------
// Sessions
// -----------------------------------------------------------------------

#[tokio::test]
async fn session_lookup_by_token_hash() {
    let repo = SurrealSessionRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    let session = repo
        .create(session_for(user_id, "hash-a", Duration::hours(1)))
        .await
        .unwrap();

    let found = repo.get_by_token_hash("hash-a").await.unwrap();
    assert_eq!(found.id, session.id);
    assert_eq!(found.user_id, user_id);

    assert!(repo.get_by_token_hash("hash-b").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn list_active_skips_expired_sessions() {
    let repo = SurrealSessionRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    let live = repo
        .create(session_for(user_id, "live", Duration::hours(1)))
        .await
        .unwrap();
    repo.create(session_for(user_id, "stale", Duration::hours(-1)))
        .await
        .unwrap();

    let active = repo.list_active(user_id, Utc::now()).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, live.id);

    assert_eq!(repo.delete_expired(Utc::now()).await.unwrap(), 1);
}

#[tokio::test]
async fn touch_refuses_expired_sessions() {
    let repo = SurrealSessionRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    let live = repo
        .create(session_for(user_id, "live", Duration::hours(1)))
        .await
        .unwrap();
    let stale = repo
        .create(session_for(user_id, "stale", Duration::hours(-1)))
        .await
        .unwrap();

    assert!(repo.touch(live.id).await.unwrap());
    assert!(!repo.touch(stale.id).await.unwrap());
    assert!(!repo.touch(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn delete_for_user_except_keeps_one() {
    let repo = SurrealSessionRepository::new(setup().await);
    let user_id = Uuid::new_v4();
    let other_user = Uuid::new_v4();

    let keep = repo
        .create(session_for(user_id, "keep", Duration::hours(1)))
        .await
        .unwrap();
    repo.create(session_for(user_id, "drop-1", Duration::hours(1)))
        .await
        .unwrap();
    repo.create(session_for(user_id, "drop-2", Duration::hours(1)))
        .await
        .unwrap();
    repo.create(session_for(other_user, "other", Duration::hours(1)))
        .await
        .unwrap();

    let removed = repo.delete_for_user_except(user_id, keep.id).await.unwrap();
    assert_eq!(removed, 2);

    let remaining = repo.list_active(user_id, Utc::now()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);

    assert!(repo.delete(keep.id).await.unwrap());
    assert!(!repo.delete(keep.id).await.unwrap());
    assert_eq!(repo.delete_for_user(other_user).await.unwrap(), 1);
}

// -----------------------------------------------------------------------
// Login attempts
// -----------------------------------------------------------------------

#[tokio::test]
async fn failure_counts_respect_window_and_outcome() {
    let repo = SurrealLoginAttemptRepository::new(setup().await);
    let window_start = Utc::now() - Duration::minutes(15);

    for _ in 0..3 {
        repo.record(CreateLoginAttempt::failure(
            "bob@example.com",
            "10.0.0.7",
            FailureReason::InvalidPassword,
            None,
        ))
        .await
        .unwrap();
    }
    repo.record(CreateLoginAttempt::success(
        "bob@example.com",
        "10.0.0.7",
        Uuid::new_v4(),
    ))
    .await
    .unwrap();

    assert_eq!(
        repo.count_failures_by_email("bob@example.com", window_start)
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        repo.count_failures_by_ip("10.0.0.7", window_start)
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        repo.count_failures_by_email("bob@example.com", Utc::now())
            .await
            .unwrap(),
        0
    );

    let recent = repo.recent_by_email("bob@example.com", 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].success);
    assert_eq!(recent[1].failure_reason, Some(FailureReason::InvalidPassword));
}

#[tokio::test]
async fn retention_sweep_deletes_old_attempts() {
    let db = setup().await;
    let repo = SurrealLoginAttemptRepository::new(db.clone());

    repo.record(CreateLoginAttempt::failure(
        "old@example.com",
        "10.0.0.8",
        FailureReason::UserNotFound,
        None,
    ))
    .await
    .unwrap();
    db.query("UPDATE login_attempt SET attempted_at = time::now() - 40d")
        .await
        .unwrap()
        .check()
        .unwrap();
    repo.record(CreateLoginAttempt::failure(
        "new@example.com",
        "10.0.0.8",
        FailureReason::UserNotFound,
        None,
    ))
    .await
    .unwrap();

    let cutoff = Utc::now() - Duration::days(30);
    assert_eq!(repo.delete_older_than(cutoff).await.unwrap(), 1);
    assert_eq!(repo.recent_by_email("new@example.com", 10).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sweeps_report_each_row_once() {
    let db = setup().await;
    let repo = SurrealLoginAttemptRepository::new(db.clone());

    for n in 0..12 {
        repo.record(CreateLoginAttempt::failure(
            &format!("user{n}@example.com"),
            "10.0.0.9",
            FailureReason::InvalidPassword,
            None,
        ))
        .await
        .unwrap();
    }
    db.query("UPDATE login_attempt SET attempted_at = time::now() - 40d")
        .await
        .unwrap()
        .check()
        .unwrap();

    let cutoff = Utc::now() - Duration::days(30);
    let sweeps: Vec<_> = (0..3)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.delete_older_than(cutoff).await })
        })
        .collect();
    let mut removed = 0;
    for sweep in sweeps {
        removed += sweep.await.unwrap().unwrap();
    }

    assert_eq!(removed, 12);
    assert_eq!(repo.delete_older_than(cutoff).await.unwrap(), 0);
}

// -----------------------------------------------------------------------
// Reset tokens & password history
// -----------------------------------------------------------------------

#[tokio::test]
async fn reset_token_can_only_be_marked_used_once() {
    let repo = SurrealPasswordResetRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    let token = repo
        .create(CreatePasswordResetToken {
            user_id,
            email: "carol@example.com".into(),
            token_hash: "reset-hash".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();
    assert!(!token.used);

    assert!(repo.mark_used(token.id).await.unwrap());
    assert!(!repo.mark_used(token.id).await.unwrap());

    let fetched = repo.get_by_token_hash("reset-hash").await.unwrap();
    assert!(fetched.used);
}

#[tokio::test]
async fn password_history_is_newest_first_and_prunable() {
    let repo = SurrealPasswordHistoryRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    for n in 0..4 {
        repo.append(user_id, format!("hash-{n}")).await.unwrap();
    }

    let recent = repo.recent(user_id, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].password_hash, "hash-3");
    assert_eq!(recent[1].password_hash, "hash-2");

    assert_eq!(repo.prune(user_id, 2).await.unwrap(), 2);
    assert_eq!(repo.recent(user_id, 10).await.unwrap().len(), 2);
}

// -----------------------------------------------------------------------
// Audit log
// -----------------------------------------------------------------------

fn audit(event_type: AuditEventType, user_id: Option<Uuid>, ip: &str) -> CreateAuditLogEntry {
    CreateAuditLogEntry {
        event_type,
        user_id,
        tenant_id: None,
        ip_address: ip.into(),
        user_agent: None,
        metadata: Some(serde_json::json!({ "email": "dave@example.com" })),
    }
}

#[tokio::test]
async fn audit_search_filters_and_paginates() {
    let repo = SurrealAuditLogRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    for _ in 0..3 {
        repo.append(audit(AuditEventType::LoginFailed, Some(user_id), "10.1.1.1"))
            .await
            .unwrap();
    }
    repo.append(audit(AuditEventType::LoginSuccess, Some(user_id), "10.1.1.1"))
        .await
        .unwrap();
    repo.append(audit(AuditEventType::LoginFailed, None, "10.2.2.2"))
        .await
        .unwrap();

    let page = repo
        .search(
            AuditLogFilter {
                user_id: Some(user_id),
                event_type: Some(AuditEventType::LoginFailed),
                ..Default::default()
            },
            Pagination {
                offset: 0,
                limit: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.items[0].created_at >= page.items[1].created_at);
    assert_eq!(page.items[0].metadata["email"], "dave@example.com");

    let everything = repo
        .search(AuditLogFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(everything.total, 5);
}

#[tokio::test]
async fn audit_statistics_count_types_users_and_addresses() {
    let repo = SurrealAuditLogRepository::new(setup().await);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let from = Utc::now() - Duration::minutes(1);

    repo.append(audit(AuditEventType::LoginFailed, Some(alice), "10.1.1.1"))
        .await
        .unwrap();
    repo.append(audit(AuditEventType::LoginFailed, Some(bob), "10.1.1.2"))
        .await
        .unwrap();
    repo.append(audit(AuditEventType::LoginSuccess, Some(alice), "10.1.1.1"))
        .await
        .unwrap();
    repo.append(audit(AuditEventType::LoginFailed, None, "10.1.1.3"))
        .await
        .unwrap();

    let stats = repo
        .statistics(from, Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(stats.events_by_type.get(&AuditEventType::LoginFailed), Some(&3));
    assert_eq!(stats.events_by_type.get(&AuditEventType::LoginSuccess), Some(&1));
    assert_eq!(stats.distinct_users, 2);
    assert_eq!(stats.distinct_addresses, 3);
}
