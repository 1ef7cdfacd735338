//! Integration tests for password change, password reset and history.

mod common;

use bastion_auth::{
    AuthError, AuthenticationService, LoginRequest, PasswordChangeFlow, PasswordPolicy,
    PasswordResetFlow, ResetTokenProblem, ResetTokenStatus,
};
use bastion_core::models::audit::AuditEventType;
use bastion_core::repository::{
    AuditLogFilter, AuditLogRepository, Pagination, PasswordHistoryRepository, Store,
    UserRepository,
};
use common::{PASSWORD, break_audit_log, config, ctx, exec, seed_user, store};
use uuid::Uuid;

fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.into(),
        password: password.into(),
        tenant_identifier: None,
        remember_me: false,
    }
}

// -----------------------------------------------------------------------
// Change
// -----------------------------------------------------------------------

#[tokio::test]
async fn change_checks_run_in_order() {
    let store = store().await;
    let user = seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let flow = PasswordChangeFlow::new(store.clone(), config());

    assert!(matches!(
        flow.change(user.id, "Not-The-Password-1", "Brand-New-Secret-7", None, &ctx())
            .await,
        Err(AuthError::Unauthorized)
    ));
    assert!(matches!(
        flow.change(user.id, PASSWORD, "short", None, &ctx()).await,
        Err(AuthError::WeakPassword(_))
    ));
    assert!(matches!(
        flow.change(user.id, PASSWORD, PASSWORD, None, &ctx()).await,
        Err(AuthError::PasswordUnchanged)
    ));

    let stored = store.users().get_by_id(user.id).await.unwrap();
    assert_eq!(stored.password_hash, user.password_hash);
}

#[tokio::test]
async fn history_blocks_the_last_five_passwords() {
    let store = store().await;
    let user = seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let flow = PasswordChangeFlow::new(store.clone(), config());

    let passwords: Vec<String> = (1..=5).map(|n| format!("Orbital-Sunrise-{n}0")).collect();
    let mut current = PASSWORD.to_string();
    for next in &passwords {
        flow.change(user.id, &current, next, None, &ctx()).await.unwrap();
        current = next.clone();
    }

    let history = store.password_history().recent(user.id, 100).await.unwrap();
    assert_eq!(history.len(), 5);

    // Every retained password except the current one is "reused".
    for old in &passwords[..4] {
        assert!(matches!(
            flow.change(user.id, &current, old, None, &ctx()).await,
            Err(AuthError::PasswordReused)
        ));
    }

    // The seed password fell out of history and is allowed again.
    flow.change(user.id, &current, PASSWORD, None, &ctx()).await.unwrap();

    let policy = PasswordPolicy::new(store.clone(), config());
    assert!(!policy.check_history(user.id, &passwords[0]).await.unwrap());
    assert!(policy.check_history(user.id, &passwords[1]).await.unwrap());
}

#[tokio::test]
async fn change_keeps_only_the_initiating_session() {
    let store = store().await;
    let user = seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let service = AuthenticationService::new(store.clone(), config());
    let flow = PasswordChangeFlow::new(store.clone(), config());

    let current = service
        .authenticate(&login("riley@platform.test", PASSWORD), &ctx())
        .await
        .unwrap();
    let other = service
        .authenticate(&login("riley@platform.test", PASSWORD), &ctx())
        .await
        .unwrap();

    flow.change(
        user.id,
        PASSWORD,
        "Brand-New-Secret-7",
        Some(current.session_id),
        &ctx(),
    )
    .await
    .unwrap();

    service
        .refresh_token(&current.tokens.refresh_token, &ctx())
        .await
        .unwrap();
    assert!(matches!(
        service.refresh_token(&other.tokens.refresh_token, &ctx()).await,
        Err(AuthError::SessionNotFound)
    ));

    service
        .authenticate(&login("riley@platform.test", "Brand-New-Secret-7"), &ctx())
        .await
        .unwrap();

    let changed = store
        .audit_log()
        .search(
            AuditLogFilter {
                event_type: Some(AuditEventType::PasswordChanged),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(changed.total, 1);
}

// -----------------------------------------------------------------------
// Reset
// -----------------------------------------------------------------------

#[tokio::test]
async fn unknown_email_gets_a_token_but_nothing_is_stored() {
    let store = store().await;
    let flow = PasswordResetFlow::new(store.clone(), config());

    let issued = flow.request("nobody@platform.test", &ctx()).await.unwrap();
    assert_eq!(issued.token.len(), 64);
    assert!(issued.expires_at > chrono::Utc::now());

    assert_eq!(
        flow.validate(&issued.token).await.unwrap(),
        ResetTokenStatus::Invalid(ResetTokenProblem::NotFound)
    );
    let audit = store
        .audit_log()
        .search(AuditLogFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(audit.total, 0);
}

#[tokio::test]
async fn new_request_invalidates_the_previous_token() {
    let store = store().await;
    seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let flow = PasswordResetFlow::new(store.clone(), config());

    let first = flow.request("riley@platform.test", &ctx()).await.unwrap();
    let second = flow.request("Riley@Platform.test", &ctx()).await.unwrap();

    assert_eq!(
        flow.validate(&first.token).await.unwrap(),
        ResetTokenStatus::Invalid(ResetTokenProblem::NotFound)
    );
    assert_eq!(
        flow.validate(&second.token).await.unwrap(),
        ResetTokenStatus::Valid {
            email: "riley@platform.test".into()
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_leave_one_valid_token() {
    let store = store().await;
    seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let flow = PasswordResetFlow::new(store.clone(), config());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let flow = flow.clone();
            tokio::spawn(async move { flow.request("riley@platform.test", &ctx()).await })
        })
        .collect();
    let mut issued = Vec::new();
    for handle in handles {
        issued.push(handle.await.unwrap().unwrap());
    }

    let mut valid = 0;
    for token in &issued {
        if matches!(
            flow.validate(&token.token).await.unwrap(),
            ResetTokenStatus::Valid { .. }
        ) {
            valid += 1;
        }
    }
    assert_eq!(valid, 1);
}

#[tokio::test]
async fn complete_resets_password_and_signs_out_everywhere() {
    let store = store().await;
    let user = seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let service = AuthenticationService::new(store.clone(), config());
    let flow = PasswordResetFlow::new(store.clone(), config());

    let session = service
        .authenticate(&login("riley@platform.test", PASSWORD), &ctx())
        .await
        .unwrap();
    let issued = flow.request("riley@platform.test", &ctx()).await.unwrap();

    flow.complete(&issued.token, "Recovered-Secret-8", &ctx())
        .await
        .unwrap();

    assert!(service.list_sessions(user.id, None).await.unwrap().is_empty());
    assert!(matches!(
        service.refresh_token(&session.tokens.refresh_token, &ctx()).await,
        Err(AuthError::SessionNotFound)
    ));
    service
        .authenticate(&login("riley@platform.test", "Recovered-Secret-8"), &ctx())
        .await
        .unwrap();

    assert_eq!(
        flow.validate(&issued.token).await.unwrap(),
        ResetTokenStatus::Invalid(ResetTokenProblem::AlreadyUsed)
    );
    assert!(matches!(
        flow.complete(&issued.token, "Another-Secret-9", &ctx()).await,
        Err(AuthError::ResetTokenInvalid)
    ));
    assert_eq!(store.password_history().recent(user.id, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn reset_enforces_the_password_policy() {
    let store = store().await;
    seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let flow = PasswordResetFlow::new(store.clone(), config());
    let issued = flow.request("riley@platform.test", &ctx()).await.unwrap();

    assert!(matches!(
        flow.complete(&issued.token, "password123", &ctx()).await,
        Err(AuthError::WeakPassword(_))
    ));
    assert!(matches!(
        flow.complete(&issued.token, PASSWORD, &ctx()).await,
        Err(AuthError::PasswordUnchanged)
    ));

    // Rejected attempts do not consume the token.
    assert!(matches!(
        flow.validate(&issued.token).await.unwrap(),
        ResetTokenStatus::Valid { .. }
    ));
}

#[tokio::test]
async fn expired_token_is_rejected_and_swept() {
    let store = store().await;
    seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let flow = PasswordResetFlow::new(store.clone(), config());
    let issued = flow.request("riley@platform.test", &ctx()).await.unwrap();

    exec(&store, "UPDATE password_reset_token SET expires_at = time::now() - 1m").await;

    assert_eq!(
        flow.validate(&issued.token).await.unwrap(),
        ResetTokenStatus::Invalid(ResetTokenProblem::Expired)
    );
    assert!(matches!(
        flow.complete(&issued.token, "Recovered-Secret-8", &ctx()).await,
        Err(AuthError::ResetTokenInvalid)
    ));
    assert_eq!(flow.cleanup_expired().await.unwrap(), 1);
    assert_eq!(flow.cleanup_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn change_for_unknown_user_is_not_found() {
    let store = store().await;
    let flow = PasswordChangeFlow::new(store.clone(), config());
    assert!(matches!(
        flow.change(Uuid::new_v4(), PASSWORD, "Brand-New-Secret-7", None, &ctx())
            .await,
        Err(AuthError::NotFound { .. })
    ));
}

#[tokio::test]
async fn audit_outage_does_not_fail_password_flows() {
    let store = store().await;
    let user = seed_user(&store, None, "riley@platform.test", PASSWORD).await;
    let change = PasswordChangeFlow::new(store.clone(), config());
    let reset = PasswordResetFlow::new(store.clone(), config());
    break_audit_log(&store).await;

    change
        .change(user.id, PASSWORD, "Brand-New-Secret-7", None, &ctx())
        .await
        .unwrap();

    let issued = reset.request("riley@platform.test", &ctx()).await.unwrap();
    reset
        .complete(&issued.token, "Recovered-Secret-8", &ctx())
        .await
        .unwrap();

    let stored = store.users().get_by_id(user.id).await.unwrap();
    assert_ne!(stored.password_hash, user.password_hash);
    assert_eq!(
        reset.validate(&issued.token).await.unwrap(),
        ResetTokenStatus::Invalid(ResetTokenProblem::AlreadyUsed)
    );
}
