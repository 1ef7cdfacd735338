//! Shared fixtures for the auth integration tests.

#![allow(dead_code)]

use bastion_auth::AuthConfig;
use bastion_auth::password::hash_password;
use bastion_core::RequestContext;
use bastion_core::models::tenant::{CreateTenant, Tenant, TenantStatus};
use bastion_core::models::user::{CreateUser, User, UserRole};
use bastion_core::repository::{
    PasswordHistoryRepository, Store, TenantRepository, UserRepository,
};
use bastion_db::SurrealStore;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

pub type TestStore = SurrealStore<Db>;

pub const PASSWORD: &str = "Orbital-Sunset-42";

/// Default policy with cheap Argon2 parameters.
pub fn config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "integration-test-secret".into(),
        jwt_issuer: "bastion-test".into(),
        argon2_memory_kib: 8,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..AuthConfig::default()
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new("203.0.113.7", Some("integration-test".into()))
}

pub async fn store() -> TestStore {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    bastion_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

pub async fn seed_tenant(store: &TestStore, subdomain: &str, status: TenantStatus) -> Tenant {
    store
        .tenants()
        .create(CreateTenant {
            name: format!("{subdomain} Inc"),
            email: format!("ops@{subdomain}.test"),
            subdomain: subdomain.into(),
            custom_domain: Some(format!("login.{subdomain}.test")),
            status,
        })
        .await
        .unwrap()
}

/// A member of `tenant_id` whose password is `password`, with that
/// password as the only history entry.
pub async fn seed_user(
    store: &TestStore,
    tenant_id: Option<Uuid>,
    email: &str,
    password: &str,
) -> User {
    seed_user_with(store, tenant_id, email, password, &config()).await
}

/// Like [`seed_user`], hashing with the cost parameters of `config`.
pub async fn seed_user_with(
    store: &TestStore,
    tenant_id: Option<Uuid>,
    email: &str,
    password: &str,
    config: &AuthConfig,
) -> User {
    let hash = hash_password(password, config).unwrap();
    let user = store
        .users()
        .create(CreateUser {
            tenant_id,
            email: email.into(),
            name: "Riley Quinn".into(),
            password_hash: hash.clone(),
            role: if tenant_id.is_some() {
                UserRole::Member
            } else {
                UserRole::PlatformAdmin
            },
            require_password_change: false,
        })
        .await
        .unwrap();
    store.password_history().append(user.id, hash).await.unwrap();
    user
}

/// Make every audit write fail while leaving the rest of the store
/// working.
pub async fn break_audit_log(store: &TestStore) {
    exec(
        store,
        "DEFINE FIELD OVERWRITE ip_address ON TABLE audit_log TYPE string \
         ASSERT $value = 'unreachable'",
    )
    .await;
}

/// Run a raw statement against the test database, e.g. to move
/// timestamps into the past.
pub async fn exec(store: &TestStore, sql: &str) {
    store.client().query(sql).await.unwrap().check().unwrap();
}
