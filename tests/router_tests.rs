mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use common::{PASSWORD, TestContext, json_body};
use know_my_patient::{
    AppConfig, apply_global_layers, create_router,
    middleware::csrf::{self, CSRF_HEADER},
    models::UserRole,
    repository::Repository,
};
use serde_json::json;
use tokio::test;
use tower::ServiceExt;

fn app(ctx: &TestContext) -> Router {
    create_router(ctx.state.clone())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_as(uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, csrf_token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "198.51.100.20");
    if let Some(token) = csrf_token {
        builder = builder.header(CSRF_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[test]
async fn test_health_reports_database_state() {
    let ctx = TestContext::new();

    let response = app(&ctx).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "up");

    ctx.repo.set_offline(true);
    let response = app(&ctx).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "down");
}

#[test]
async fn test_security_headers_on_every_response() {
    let ctx = TestContext::new();

    for uri in ["/health", "/me", "/does-not-exist"] {
        let response = app(&ctx).oneshot(get(uri)).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff", "{uri}");
        assert_eq!(headers["x-frame-options"], "DENY", "{uri}");
        assert_eq!(
            headers["referrer-policy"],
            "strict-origin-when-cross-origin",
            "{uri}"
        );
        assert!(headers.contains_key("content-security-policy"), "{uri}");
        // Local config: no HSTS.
        assert!(!headers.contains_key("strict-transport-security"), "{uri}");
    }
}

#[test]
async fn test_hsts_only_in_production() {
    let config = AppConfig {
        env: know_my_patient::config::Env::Production,
        ..AppConfig::default()
    };
    let ctx = TestContext::with_config(config);

    let response = app(&ctx).oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("strict-transport-security"));
}

#[test]
async fn test_protected_routes_require_a_valid_token() {
    let ctx = TestContext::new();

    for uri in ["/me", "/dashboard", "/patients/mine", "/admin/stats"] {
        let response = app(&ctx).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let response = app(&ctx)
        .oneshot(get_as("/me", "Bearer not.a.jwt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[test]
async fn test_token_stops_working_when_account_is_disabled() {
    let ctx = TestContext::new();
    let user = ctx.seed_user(UserRole::Patient, "pat@example.com").await;
    let bearer = ctx.bearer(&user);

    let response = app(&ctx).oneshot(get_as("/me", &bearer)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], "pat@example.com");
    assert!(body.get("password_hash").is_none());

    ctx.repo.set_user_active(user.id, false).await.unwrap();
    let response = app(&ctx).oneshot(get_as("/me", &bearer)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
async fn test_admin_routes_are_role_gated() {
    let ctx = TestContext::new();
    let patient = ctx.seed_user(UserRole::Patient, "pat@example.com").await;
    let nurse = ctx.seed_user(UserRole::NhsUser, "nurse@nhs.net").await;
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;

    for user in [&patient, &nurse] {
        let response = app(&ctx)
            .oneshot(get_as("/admin/users", &ctx.bearer(user)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "forbidden");
    }

    let response = app(&ctx)
        .oneshot(get_as("/admin/users?role=nhs_user", &ctx.bearer(&admin_user)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["email"], "nurse@nhs.net");
}

#[test]
async fn test_search_is_forbidden_for_patients() {
    let ctx = TestContext::new();
    let patient = ctx.seed_user(UserRole::Patient, "pat@example.com").await;

    let response = app(&ctx)
        .oneshot(get_as("/patients/search?q=jones", &ctx.bearer(&patient)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_public_forms_require_csrf_token() {
    let ctx = TestContext::new();
    let body = json!({ "email": "pat@example.com", "password": PASSWORD });

    let response = app(&ctx)
        .oneshot(post_json("/login", None, body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error = json_body(response).await;
    assert_eq!(error["error"]["code"], "csrf_mismatch");

    let forged = csrf::issue_token("some-other-secret").unwrap();
    let response = app(&ctx)
        .oneshot(post_json("/login", Some(&forged), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_login_through_router_then_use_token() {
    let ctx = TestContext::new();
    ctx.seed_user(UserRole::Patient, "pat@example.com").await;

    let response = app(&ctx).oneshot(get("/csrf-token")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let csrf_token = json_body(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app(&ctx)
        .oneshot(post_json(
            "/login",
            Some(&csrf_token),
            json!({ "email": "pat@example.com", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = json_body(response).await;
    assert_eq!(session["token_type"], "Bearer");
    let bearer = format!("Bearer {}", session["token"].as_str().unwrap());

    let response = app(&ctx)
        .oneshot(get_as("/dashboard", &bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let dashboard = json_body(response).await;
    assert_eq!(dashboard["role"], "patient");
    assert!(dashboard["profile"].is_null());
}

#[test]
async fn test_rate_limit_blocks_then_other_routes_unaffected() {
    let config = AppConfig {
        rate_limit_max_attempts: 3,
        ..AppConfig::default()
    };
    let ctx = TestContext::with_config(config);
    let router = app(&ctx);
    let csrf_token = csrf::issue_token(&ctx.state.config.csrf_secret).unwrap();
    let bad_login = json!({ "email": "ghost@example.com", "password": "Wrongpass1" });

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(post_json("/login", Some(&csrf_token), bad_login.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = router
        .clone()
        .oneshot(post_json("/login", Some(&csrf_token), bad_login.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "rate_limited");

    // Requests without a CSRF token still count against the window.
    let response = router
        .clone()
        .oneshot(post_json("/login", None, bad_login))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Each form has its own window.
    let response = router
        .clone()
        .oneshot(post_json(
            "/password/forgot",
            Some(&csrf_token),
            json!({ "email": "ghost@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
async fn test_anonymous_support_ticket_through_router() {
    let ctx = TestContext::new();
    let csrf_token = csrf::issue_token(&ctx.state.config.csrf_secret).unwrap();

    let response = app(&ctx)
        .oneshot(post_json(
            "/support",
            Some(&csrf_token),
            json!({
                "name": "Sam Patel",
                "email": "sam@example.com",
                "subject": "Lost card",
                "message": "I have lost my card, can I order another?"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let tickets = ctx.repo.list_support_messages(None).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].user_id, None);
}

#[test]
async fn test_openapi_document_is_served() {
    let ctx = TestContext::new();
    let response = app(&ctx)
        .oneshot(get("/api-docs/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/admin/card-requests/{id}/status"].is_object());
    assert!(doc["paths"]["/patient/profile/{uid}"].is_object());
}

#[test]
async fn test_malformed_input_gets_the_json_error_body() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;
    let csrf_token = csrf::issue_token(&ctx.state.config.csrf_secret).unwrap();

    // Missing field in an otherwise well-formed body.
    let response = app(&ctx)
        .oneshot(post_json(
            "/login",
            Some(&csrf_token),
            json!({ "email": "a@b.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_failed");
    assert!(body["error"]["fields"]["body"]
        .as_str()
        .unwrap()
        .contains("password"));

    // Path parameter that is not a UUID.
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/admin/users/not-a-uuid/role")
        .header(header::AUTHORIZATION, ctx.bearer(&admin_user))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "role": "family" }).to_string()))
        .unwrap();
    let response = app(&ctx).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "bad_request");

    // Query value outside the enum.
    let response = app(&ctx)
        .oneshot(get_as("/admin/users?role=wizard", &ctx.bearer(&admin_user)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "bad_request");
}

#[test]
async fn test_swagger_ui_gets_a_same_origin_policy() {
    let ctx = TestContext::new();

    let response = app(&ctx).oneshot(get("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    let policy = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
    assert!(policy.starts_with("default-src 'self'"), "{policy}");
    assert!(policy.contains("frame-ancestors 'none'"));
    assert_eq!(headers["x-content-type-options"], "nosniff");

    // The API itself keeps the strict policy.
    let response = app(&ctx).oneshot(get("/health")).await.unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_SECURITY_POLICY],
        "default-src 'none'; frame-ancestors 'none'"
    );
}

async fn exploding_handler() -> &'static str {
    panic!("handler exploded")
}

#[test]
async fn test_panicking_handler_returns_hardened_json_500() {
    let router = apply_global_layers(Router::new().route("/boom", axum::routing::get(exploding_handler)), true);

    let response = router.oneshot(get("/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "internal_error");
    assert_eq!(body["error"]["message"], "An internal error occurred");
}
