//! Integration tests for tenant onboarding and the maintenance sweeps.

mod common;

use bastion_auth::{
    AuthError, AuthenticationService, LoginRequest, Maintenance, RegisterTenant,
    RegistrationFlow, SweepReport,
};
use bastion_core::models::audit::AuditEventType;
use bastion_core::models::tenant::TenantStatus;
use bastion_core::models::user::UserRole;
use bastion_core::repository::{
    AuditLogFilter, AuditLogRepository, Pagination, PasswordHistoryRepository, Store,
    TenantRepository, UserRepository,
};
use common::{PASSWORD, break_audit_log, config, ctx, exec, seed_tenant, seed_user, store};
use uuid::Uuid;

fn acme(subdomain: &str) -> RegisterTenant {
    RegisterTenant {
        name: "Acme Corp".into(),
        email: "ops@acme.test".into(),
        subdomain: subdomain.into(),
        custom_domain: Some("https://Login.Acme.test/".into()),
        admin_name: "Morgan Lee".into(),
        admin_email: "morgan@acme.test".into(),
        admin_password: PASSWORD.into(),
    }
}

fn portal_login(portal: &str) -> LoginRequest {
    LoginRequest {
        email: "morgan@acme.test".into(),
        password: PASSWORD.into(),
        tenant_identifier: Some(portal.into()),
        remember_me: false,
    }
}

#[tokio::test]
async fn register_then_approve() {
    let store = store().await;
    let flow = RegistrationFlow::new(store.clone(), config());
    let service = AuthenticationService::new(store.clone(), config());
    let operator = Uuid::new_v4();

    let registration = flow.register(acme(" Acme "), &ctx()).await.unwrap();
    assert_eq!(registration.tenant.subdomain, "acme");
    assert_eq!(registration.tenant.custom_domain.as_deref(), Some("login.acme.test"));
    assert_eq!(registration.tenant.status, TenantStatus::PendingVerification);
    assert_eq!(registration.admin.role, UserRole::TenantAdmin);
    assert_eq!(registration.admin.tenant_id, Some(registration.tenant.id));

    let history = store
        .password_history()
        .recent(registration.admin.id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    // Pending portals do not serve logins.
    assert!(matches!(
        service.validate_credentials(&portal_login("acme"), &ctx()).await,
        Err(AuthError::InvalidCredentials)
    ));

    let approved = flow
        .approve(registration.tenant.id, operator, &ctx())
        .await
        .unwrap();
    assert_eq!(approved.status, TenantStatus::Active);

    service
        .authenticate(&portal_login("login.acme.test"), &ctx())
        .await
        .unwrap();

    // Only pending tenants can be approved.
    assert!(matches!(
        flow.approve(registration.tenant.id, operator, &ctx()).await,
        Err(AuthError::BadRequest(_))
    ));

    let created = store
        .audit_log()
        .search(
            AuditLogFilter {
                event_type: Some(AuditEventType::UserCreated),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(created.total, 1);
    assert_eq!(created.items[0].tenant_id, Some(registration.tenant.id));
    assert_eq!(created.items[0].metadata["subdomain"], "acme");

    let approvals = store
        .audit_log()
        .search(
            AuditLogFilter {
                event_type: Some(AuditEventType::TenantApproved),
                user_id: Some(operator),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(approvals.total, 1);
}

#[tokio::test]
async fn reject_suspends_with_reason() {
    let store = store().await;
    let flow = RegistrationFlow::new(store.clone(), config());
    let operator = Uuid::new_v4();

    let registration = flow.register(acme("acme"), &ctx()).await.unwrap();
    let rejected = flow
        .reject(registration.tenant.id, "Incomplete paperwork", operator, &ctx())
        .await
        .unwrap();
    assert_eq!(rejected.status, TenantStatus::Suspended);

    assert!(matches!(
        flow.reject(registration.tenant.id, "again", operator, &ctx()).await,
        Err(AuthError::BadRequest(_))
    ));
    assert!(matches!(
        flow.approve(Uuid::new_v4(), operator, &ctx()).await,
        Err(AuthError::NotFound { .. })
    ));

    let entries = store
        .audit_log()
        .search(
            AuditLogFilter {
                event_type: Some(AuditEventType::TenantRejected),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(entries.items[0].metadata["reason"], "Incomplete paperwork");
}

#[tokio::test]
async fn audit_outage_does_not_fail_approve_or_reject() {
    let store = store().await;
    let flow = RegistrationFlow::new(store.clone(), config());
    let operator = Uuid::new_v4();
    break_audit_log(&store).await;

    let approved = flow.register(acme("acme"), &ctx()).await.unwrap();
    let rejected = flow
        .register(
            RegisterTenant {
                email: "ops@globex.test".into(),
                custom_domain: None,
                admin_email: "hank@globex.test".into(),
                ..acme("globex")
            },
            &ctx(),
        )
        .await
        .unwrap();

    let tenant = flow.approve(approved.tenant.id, operator, &ctx()).await.unwrap();
    assert_eq!(tenant.status, TenantStatus::Active);
    let tenant = flow
        .reject(rejected.tenant.id, "Incomplete paperwork", operator, &ctx())
        .await
        .unwrap();
    assert_eq!(tenant.status, TenantStatus::Suspended);
}

#[tokio::test]
async fn reserved_subdomain_is_rejected_before_any_write() {
    let store = store().await;
    let flow = RegistrationFlow::new(store.clone(), config());

    let err = flow.register(acme("www"), &ctx()).await.unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));

    assert!(!store.tenants().subdomain_exists("www").await.unwrap());
    assert!(
        store
            .users()
            .get_by_email("morgan@acme.test")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn uniqueness_and_strength_are_checked_up_front() {
    let store = store().await;
    let existing = seed_tenant(&store, "acme", TenantStatus::Active).await;
    seed_user(&store, Some(existing.id), "taken@acme.test", PASSWORD).await;
    let flow = RegistrationFlow::new(store.clone(), config());

    let taken_subdomain = flow.register(acme("acme"), &ctx()).await.unwrap_err();
    assert!(taken_subdomain.to_string().contains("taken"));

    let taken_tenant_email = flow
        .register(
            RegisterTenant {
                email: "ops@acme.test".into(),
                ..acme("acme-two")
            },
            &ctx(),
        )
        .await
        .unwrap_err();
    assert!(matches!(taken_tenant_email, AuthError::BadRequest(_)));

    let taken_admin_email = flow
        .register(
            RegisterTenant {
                email: "ops@acme-three.test".into(),
                admin_email: "Taken@Acme.test".into(),
                ..acme("acme-three")
            },
            &ctx(),
        )
        .await
        .unwrap_err();
    assert!(matches!(taken_admin_email, AuthError::BadRequest(_)));

    let weak = flow
        .register(
            RegisterTenant {
                email: "ops@acme-four.test".into(),
                admin_password: "morgan2024".into(),
                ..acme("acme-four")
            },
            &ctx(),
        )
        .await
        .unwrap_err();
    assert!(matches!(weak, AuthError::WeakPassword(_)));

    for subdomain in ["acme-two", "acme-three", "acme-four"] {
        assert!(!store.tenants().subdomain_exists(subdomain).await.unwrap());
    }
}

#[tokio::test]
async fn sweeps_remove_only_stale_rows() {
    let store = store().await;
    seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let service = AuthenticationService::new(store.clone(), config());
    let maintenance = Maintenance::new(store.clone(), config());

    let login = LoginRequest {
        email: "riley@platform.test".into(),
        password: PASSWORD.into(),
        tenant_identifier: None,
        remember_me: false,
    };
    service.authenticate(&login, &ctx()).await.unwrap();

    exec(&store, "UPDATE login_attempt SET attempted_at = time::now() - 31d").await;
    exec(&store, "UPDATE session SET expires_at = time::now() - 1m").await;
    exec(&store, "UPDATE audit_log SET created_at = time::now() - 91d").await;

    service.authenticate(&login, &ctx()).await.unwrap();

    let report = maintenance.run_all().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            login_attempts: 1,
            audit_entries: 1,
            sessions: 1,
            reset_tokens: 0,
        }
    );

    // Idempotent.
    assert_eq!(maintenance.run_all().await.unwrap(), SweepReport::default());
}
