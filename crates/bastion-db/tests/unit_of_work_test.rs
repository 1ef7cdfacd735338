//! Integration tests for transactional write batches.

use bastion_core::models::login_attempt::{CreateLoginAttempt, FailureReason};
use bastion_core::models::tenant::{CreateTenant, TenantStatus};
use bastion_core::models::user::{CreateUser, UserRole};
use bastion_core::repository::{
    LoginAttemptRepository, PasswordHistoryRepository, Store, TenantRepository, UnitOfWork,
    UserRepository,
};
use bastion_db::SurrealStore;
use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> SurrealStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    bastion_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

fn tenant(subdomain: &str, email: &str) -> CreateTenant {
    CreateTenant {
        name: "Initech".into(),
        email: email.into(),
        subdomain: subdomain.into(),
        custom_domain: None,
        status: TenantStatus::PendingVerification,
    }
}

fn admin(tenant_id: uuid::Uuid, email: &str) -> CreateUser {
    CreateUser {
        tenant_id: Some(tenant_id),
        email: email.into(),
        name: "Admin".into(),
        password_hash: "$argon2id$stub".into(),
        role: UserRole::TenantAdmin,
        require_password_change: false,
    }
}

#[tokio::test]
async fn commit_applies_every_staged_write() {
    let store = setup().await;

    let mut work = store.begin();
    let staged_tenant = work.create_tenant(tenant("initech", "ops@initech.test"));
    let staged_user = work.create_user(admin(staged_tenant.id, "peter@initech.test"));
    work.append_password_history(staged_user.id, staged_user.password_hash.clone());
    assert!(!work.is_empty());
    work.commit().await.unwrap();

    let tenant = store.tenants().get_by_id(staged_tenant.id).await.unwrap();
    assert_eq!(tenant.subdomain, "initech");
    assert_eq!(tenant.status, TenantStatus::PendingVerification);

    let user = store.users().get_by_id(staged_user.id).await.unwrap();
    assert_eq!(user.tenant_id, Some(tenant.id));
    assert_eq!(user.role, UserRole::TenantAdmin);

    let history = store
        .password_history()
        .recent(user.id, 5)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn failed_statement_rolls_back_the_whole_batch() {
    let store = setup().await;
    store
        .users()
        .create(CreateUser {
            tenant_id: None,
            email: "taken@initech.test".into(),
            name: "Existing".into(),
            password_hash: "$argon2id$stub".into(),
            role: UserRole::PlatformAdmin,
            require_password_change: false,
        })
        .await
        .unwrap();

    let mut work = store.begin();
    let staged_tenant = work.create_tenant(tenant("initrode", "ops@initrode.test"));
    // Violates the unique email index.
    work.create_user(admin(staged_tenant.id, "taken@initech.test"));
    assert!(work.commit().await.is_err());

    let missing = store
        .tenants()
        .get_by_id(staged_tenant.id)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn rollback_writes_nothing() {
    let store = setup().await;

    let mut work = store.begin();
    let staged = work.create_tenant(tenant("globex", "ops@globex.test"));
    work.rollback();

    assert!(!store.tenants().subdomain_exists("globex").await.unwrap());
    assert!(
        store
            .tenants()
            .get_by_id(staged.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn attempt_and_increment_land_together() {
    let store = setup().await;
    let user = store
        .users()
        .create(admin(uuid::Uuid::new_v4(), "milton@initech.test"))
        .await
        .unwrap();
    let since = Utc::now() - Duration::minutes(1);

    let mut work = store.begin();
    work.record_login_attempt(CreateLoginAttempt::failure(
        "milton@initech.test",
        "10.0.0.3",
        FailureReason::InvalidPassword,
        Some(user.id),
    ));
    work.increment_failed_attempts(user.id, 1, Utc::now() + Duration::minutes(30));
    work.commit().await.unwrap();

    let after = store.users().get_by_id(user.id).await.unwrap();
    assert_eq!(after.failed_login_attempts, 1);
    assert!(after.is_locked_at(Utc::now()));
    assert_eq!(
        store
            .login_attempts()
            .count_failures_by_email("milton@initech.test", since)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn empty_commit_is_a_no_op() {
    let store = setup().await;
    let work = store.begin();
    assert!(work.is_empty());
    work.commit().await.unwrap();
}
