mod common;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{Duration, Utc};
use common::{PASSWORD, TestContext, client_ip, token_after};
use know_my_patient::{
    AppConfig, AppError, AppState, MemoryRepository, MockMailer,
    extract::{AppJson, AppPath},
    handlers::{auth, password},
    models::{
        AuditAction, AuditFilter, ForgotPasswordRequest, LoginRequest, RegisterRequest,
        ResetPasswordRequest, UserRole,
    },
    repository::{Repository, RepositoryState},
    security::tokens,
};
use std::sync::Arc;
use tokio::test;

fn registration(email: &str, role: UserRole) -> RegisterRequest {
    RegisterRequest {
        name: "  Alice Carter ".to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        role,
    }
}

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[test]
async fn test_register_verify_login_flow() {
    let ctx = TestContext::new();

    let (status, Json(registered)) = auth::register_user(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(registration(" Alice@Example.COM ", UserRole::Patient)),
    )
    .await
    .expect("registration succeeds");

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(registered.user.email, "alice@example.com");
    assert_eq!(registered.user.name, "Alice Carter");
    assert!(!registered.user.email_verified);

    // Unverified accounts cannot log in yet.
    let err = auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("alice@example.com", PASSWORD)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::EmailNotVerified));

    let mails = ctx.mailer.sent_to("alice@example.com").await;
    assert_eq!(mails.len(), 1);
    let token = token_after(&mails[0].body, "/verify-email/");
    assert_eq!(token.len(), 64);

    auth::verify_email(State(ctx.state.clone()), client_ip(), AppPath(token.clone()))
        .await
        .expect("verification succeeds");

    // Tokens are single use.
    let err = auth::verify_email(State(ctx.state.clone()), client_ip(), AppPath(token))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let Json(session) = auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("ALICE@example.com", PASSWORD)),
    )
    .await
    .expect("login succeeds");

    assert_eq!(session.token_type, "Bearer");
    assert_eq!(session.expires_in, ctx.state.config.jwt_ttl_minutes * 60);
    assert!(session.user.last_login_at.is_some());

    let stored = ctx
        .repo
        .get_user(registered.user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.last_login_at.is_some());
    assert_ne!(stored.password_hash, PASSWORD);

    let actions: Vec<AuditAction> = ctx
        .repo
        .list_audit_entries(&AuditFilter {
            user_id: Some(registered.user.id),
            action: None,
            limit: 10,
        })
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::LoginSucceeded,
            AuditAction::EmailVerified,
            AuditAction::UserRegistered
        ]
    );
}

#[test]
async fn test_register_rejects_admin_role_and_non_nhs_domain() {
    let ctx = TestContext::new();

    let err = auth::register_user(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(registration("boss@example.com", UserRole::Admin)),
    )
    .await
    .unwrap_err();
    let AppError::Validation(fields) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(fields.contains_key("role"));

    let err = auth::register_user(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(registration("nurse@gmail.com", UserRole::NhsUser)),
    )
    .await
    .unwrap_err();
    let AppError::Validation(fields) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(fields.contains_key("email"));

    // Subdomains of an allowed domain are accepted.
    let (status, _) = auth::register_user(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(registration("nurse@leeds.nhs.uk", UserRole::NhsUser)),
    )
    .await
    .expect("nhs subdomain accepted");
    assert_eq!(status, StatusCode::CREATED);
}

#[test]
async fn test_register_validates_password_and_email() {
    let ctx = TestContext::new();
    let mut req = registration("not-an-email", UserRole::Family);
    req.password = "short".to_string();

    let err = auth::register_user(State(ctx.state.clone()), client_ip(), AppJson(req))
        .await
        .unwrap_err();
    let AppError::Validation(fields) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("password"));
    assert!(ctx.mailer.sent().await.is_empty());
}

#[test]
async fn test_duplicate_email_is_conflict() {
    let ctx = TestContext::new();
    ctx.seed_user(UserRole::Patient, "taken@example.com").await;

    let err = auth::register_user(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(registration("Taken@Example.com", UserRole::Family)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[test]
async fn test_registration_survives_mail_outage() {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState::new(
        repo.clone() as RepositoryState,
        Arc::new(MockMailer::failing()),
        AppConfig::default(),
    );

    let (status, Json(body)) = auth::register_user(
        State(state),
        client_ip(),
        AppJson(registration("offline@example.com", UserRole::Patient)),
    )
    .await
    .expect("mail failure does not fail the request");

    assert_eq!(status, StatusCode::CREATED);
    assert!(repo.get_user(body.user.id).await.unwrap().is_some());
}

#[test]
async fn test_login_failures_are_indistinguishable_and_audited() {
    let ctx = TestContext::new();
    let user = ctx.seed_user(UserRole::Patient, "pat@example.com").await;

    let wrong_password = auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("pat@example.com", "Wrongpass99")),
    )
    .await
    .unwrap_err();
    let unknown_email = auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("ghost@example.com", PASSWORD)),
    )
    .await
    .unwrap_err();

    assert!(matches!(wrong_password, AppError::InvalidCredentials));
    assert!(matches!(unknown_email, AppError::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());

    let failures = ctx
        .repo
        .list_audit_entries(&AuditFilter {
            user_id: None,
            action: Some(AuditAction::LoginFailed),
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(failures.len(), 2);
    // Newest first: the unknown email has no user attached.
    assert_eq!(failures[0].user_id, None);
    assert_eq!(failures[1].user_id, Some(user.id));
    assert_eq!(failures[1].ip_address.as_deref(), Some(common::TEST_IP));
}

#[test]
async fn test_disabled_account_cannot_log_in() {
    let ctx = TestContext::new();
    let user = ctx.seed_user(UserRole::Family, "fam@example.com").await;
    ctx.repo.set_user_active(user.id, false).await.unwrap();

    let err = auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("fam@example.com", PASSWORD)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AccountDisabled));
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_forgot_password_is_silent_about_unknown_accounts() {
    let ctx = TestContext::new();
    ctx.seed_user(UserRole::Patient, "known@example.com").await;

    let Json(known) = password::forgot_password(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(ForgotPasswordRequest {
            email: "known@example.com".to_string(),
        }),
    )
    .await
    .unwrap();
    let Json(unknown) = password::forgot_password(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(ForgotPasswordRequest {
            email: "nobody@example.com".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(known.message, unknown.message);
    assert_eq!(ctx.mailer.sent_to("known@example.com").await.len(), 1);
    assert!(ctx.mailer.sent_to("nobody@example.com").await.is_empty());
}

#[test]
async fn test_password_reset_consumes_every_outstanding_token() {
    let ctx = TestContext::new();
    ctx.seed_user(UserRole::Patient, "reset@example.com").await;

    for _ in 0..2 {
        password::forgot_password(
            State(ctx.state.clone()),
            client_ip(),
            AppJson(ForgotPasswordRequest {
                email: "reset@example.com".to_string(),
            }),
        )
        .await
        .unwrap();
    }
    let mails = ctx.mailer.sent_to("reset@example.com").await;
    assert_eq!(mails.len(), 2);
    let first = token_after(&mails[0].body, "token=");
    let second = token_after(&mails[1].body, "token=");

    password::reset_password(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(ResetPasswordRequest {
            token: second.clone(),
            password: "Brandnew2025".to_string(),
        }),
    )
    .await
    .expect("reset succeeds");

    for used in [first, second] {
        let err = password::reset_password(
            State(ctx.state.clone()),
            client_ip(),
            AppJson(ResetPasswordRequest {
                token: used,
                password: "Another2025".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    // Old password is gone, new one works.
    let err = auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("reset@example.com", PASSWORD)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
    auth::login(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(login_request("reset@example.com", "Brandnew2025")),
    )
    .await
    .expect("new password accepted");
}

#[test]
async fn test_expired_reset_token_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx.seed_user(UserRole::Patient, "late@example.com").await;

    let token = tokens::generate_token();
    ctx.repo
        .create_password_reset(
            user.id,
            &tokens::hash_token(&token),
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap();

    let err = password::reset_password(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(ResetPasswordRequest {
            token,
            password: "Brandnew2025".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
async fn test_reset_rejects_weak_password_before_touching_token() {
    let ctx = TestContext::new();
    let err = password::reset_password(
        State(ctx.state.clone()),
        client_ip(),
        AppJson(ResetPasswordRequest {
            token: "abc".to_string(),
            password: "password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
