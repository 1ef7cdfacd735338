//! Integration tests for the Tenant repository using in-memory SurrealDB.

use bastion_core::models::tenant::{CreateTenant, TenantStatus};
use bastion_core::repository::TenantRepository;
use bastion_db::repository::SurrealTenantRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    bastion_db::run_migrations(&db).await.unwrap();
    db
}

fn acme(status: TenantStatus) -> CreateTenant {
    CreateTenant {
        name: "ACME Corp".into(),
        email: "ops@acme.test".into(),
        subdomain: "acme".into(),
        custom_domain: Some("login.acme.test".into()),
        status,
    }
}

#[tokio::test]
async fn create_and_get_tenant() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let tenant = repo.create(acme(TenantStatus::Active)).await.unwrap();
    assert_eq!(tenant.name, "ACME Corp");
    assert_eq!(tenant.subdomain, "acme");
    assert!(tenant.is_active());

    let fetched = repo.get_by_id(tenant.id).await.unwrap();
    assert_eq!(fetched.id, tenant.id);
    assert_eq!(fetched.custom_domain.as_deref(), Some("login.acme.test"));

    let by_email = repo.get_by_email("ops@acme.test").await.unwrap();
    assert_eq!(by_email.id, tenant.id);
}

#[tokio::test]
async fn identifier_matches_subdomain_or_custom_domain() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo.create(acme(TenantStatus::Active)).await.unwrap();

    let by_sub = repo.get_by_identifier("acme").await.unwrap();
    assert_eq!(by_sub.id, tenant.id);

    let by_domain = repo.get_by_identifier("login.acme.test").await.unwrap();
    assert_eq!(by_domain.id, tenant.id);

    let missing = repo.get_by_identifier("globex").await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn subdomain_is_unique() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    repo.create(acme(TenantStatus::Active)).await.unwrap();

    assert!(repo.subdomain_exists("acme").await.unwrap());
    assert!(!repo.subdomain_exists("globex").await.unwrap());

    let mut dup = acme(TenantStatus::Active);
    dup.email = "other@acme.test".into();
    dup.custom_domain = None;
    assert!(repo.create(dup).await.is_err());
}

#[tokio::test]
async fn transition_status_only_from_expected_state() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo
        .create(acme(TenantStatus::PendingVerification))
        .await
        .unwrap();

    let approved = repo
        .transition_status(tenant.id, TenantStatus::PendingVerification, TenantStatus::Active)
        .await
        .unwrap()
        .expect("pending tenant should transition");
    assert_eq!(approved.status, TenantStatus::Active);

    let again = repo
        .transition_status(tenant.id, TenantStatus::PendingVerification, TenantStatus::Suspended)
        .await
        .unwrap();
    assert!(again.is_none());

    let current = repo.get_by_id(tenant.id).await.unwrap();
    assert_eq!(current.status, TenantStatus::Active);
}

#[tokio::test]
async fn get_missing_tenant_returns_not_found() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let err = repo.get_by_id(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}
