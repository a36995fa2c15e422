mod common;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use common::{TestContext, auth, client_ip};
use know_my_patient::{
    AppError,
    extract::{AppJson, AppPath, AppQuery},
    handlers::{admin, forms, site},
    models::{
        AuditAction, AuditQuery, CreateEnquiryRequest, CreateSupportRequest,
        CreateTestimonialRequest, EnquiryFilter, EnquiryStatus, OrganisationType, SupportFilter,
        SupportStatus, TestimonialApprovalRequest, UpdateActiveRequest,
        UpdateEnquiryStatusRequest, UpdateRoleRequest, UpdateSupportStatusRequest, UserFilter,
        UserRole,
    },
    repository::Repository,
};
use tokio::test;

fn enquiry() -> CreateEnquiryRequest {
    CreateEnquiryRequest {
        organisation_name: "St Mary's Care Home".to_string(),
        organisation_type: OrganisationType::CareHome,
        contact_name: "Jo Smith".to_string(),
        email: "Jo@StMarys.example".to_string(),
        phone: Some("0113 496 0000".to_string()),
        estimated_users: Some(40),
        message: "We would like to trial the cards with our residents.".to_string(),
    }
}

fn ticket() -> CreateSupportRequest {
    CreateSupportRequest {
        name: "Sam Patel".to_string(),
        email: "sam@example.com".to_string(),
        subject: "Card not scanning".to_string(),
        message: "The QR code on my card will not scan.".to_string(),
    }
}

#[test]
async fn test_admin_cannot_change_own_role_or_deactivate_self() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;

    let err = admin::update_user_role(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(admin_user.id),
        AppJson(UpdateRoleRequest {
            role: UserRole::Patient,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = admin::update_user_active(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(admin_user.id),
        AppJson(UpdateActiveRequest { is_active: false }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[test]
async fn test_admin_manages_other_users() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;
    let user = ctx.seed_user(UserRole::Patient, "pat@example.com").await;

    let Json(promoted) = admin::update_user_role(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(user.id),
        AppJson(UpdateRoleRequest {
            role: UserRole::Family,
        }),
    )
    .await
    .unwrap();
    assert_eq!(promoted.role, UserRole::Family);

    let Json(disabled) = admin::update_user_active(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(user.id),
        AppJson(UpdateActiveRequest { is_active: false }),
    )
    .await
    .unwrap();
    assert!(!disabled.is_active);

    let Json(families) = admin::list_users(
        State(ctx.state.clone()),
        AppQuery(UserFilter {
            role: Some(UserRole::Family),
        }),
    )
    .await
    .unwrap();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].id, user.id);

    let Json(log) = admin::get_audit_log(
        State(ctx.state.clone()),
        AppQuery(AuditQuery {
            user_id: Some(admin_user.id),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    let actions: Vec<_> = log.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::UserStatusChanged, AuditAction::UserRoleChanged]
    );
    assert_eq!(log[1].details.as_deref(), Some("role set to family"));
}

#[test]
async fn test_audit_log_limit_is_capped() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;
    let target = ctx.seed_user(UserRole::Patient, "pat@example.com").await;

    for role in [UserRole::Family, UserRole::Patient, UserRole::Family] {
        admin::update_user_role(
            auth(&admin_user),
            State(ctx.state.clone()),
            client_ip(),
            AppPath(target.id),
            AppJson(UpdateRoleRequest { role }),
        )
        .await
        .unwrap();
    }

    let Json(two) = admin::get_audit_log(
        State(ctx.state.clone()),
        AppQuery(AuditQuery {
            limit: Some(2),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(two.len(), 2);

    let Json(clamped) = admin::get_audit_log(
        State(ctx.state.clone()),
        AppQuery(AuditQuery {
            limit: Some(0),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(clamped.len(), 1);
}

#[test]
async fn test_onboarding_enquiry_is_stored_and_announced() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;

    let (status, _) = forms::submit_onboarding(State(ctx.state.clone()), AppJson(enquiry()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let notify = ctx.state.config.admin_notify_email.clone().unwrap();
    let notices = ctx.mailer.sent_to(&notify).await;
    assert_eq!(notices.len(), 1);
    assert!(notices[0].subject.contains("St Mary's Care Home"));

    let Json(queue) = admin::list_enquiries(
        State(ctx.state.clone()),
        AppQuery(EnquiryFilter {
            status: Some(EnquiryStatus::New),
        }),
    )
    .await
    .unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].email, "jo@stmarys.example");

    let Json(updated) = admin::update_enquiry_status(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(queue[0].id),
        AppJson(UpdateEnquiryStatusRequest {
            status: EnquiryStatus::Contacted,
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.status, EnquiryStatus::Contacted);
}

#[test]
async fn test_onboarding_rejects_bad_phone() {
    let ctx = TestContext::new();
    let mut req = enquiry();
    req.phone = Some("call me".to_string());

    let err = forms::submit_onboarding(State(ctx.state.clone()), AppJson(req))
        .await
        .unwrap_err();
    let AppError::Validation(fields) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(fields.contains_key("phone"));
}

#[test]
async fn test_support_ticket_links_signed_in_user_and_acknowledges() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;
    let user = ctx.seed_user(UserRole::Patient, "sam@example.com").await;

    forms::submit_support(Some(auth(&user)), State(ctx.state.clone()), AppJson(ticket()))
        .await
        .unwrap();
    forms::submit_support(None, State(ctx.state.clone()), AppJson(ticket()))
        .await
        .unwrap();

    let acks = ctx.mailer.sent_to("sam@example.com").await;
    assert_eq!(acks.len(), 2);
    assert!(acks[0].subject.contains("Card not scanning"));

    let Json(open) = admin::list_support_messages(
        State(ctx.state.clone()),
        AppQuery(SupportFilter {
            status: Some(SupportStatus::Open),
        }),
    )
    .await
    .unwrap();
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].user_id, None);
    assert_eq!(open[1].user_id, Some(user.id));

    admin::update_support_status(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(open[0].id),
        AppJson(UpdateSupportStatusRequest {
            status: SupportStatus::Resolved,
        }),
    )
    .await
    .unwrap();

    let Json(stats) = admin::get_admin_stats(State(ctx.state.clone())).await.unwrap();
    assert_eq!(stats.open_support_messages, 1);
}

#[test]
async fn test_testimonial_moderation_refreshes_public_list() {
    let ctx = TestContext::new();
    let admin_user = ctx.seed_user(UserRole::Admin, "admin@example.com").await;

    let (status, Json(created)) = admin::create_testimonial(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppJson(CreateTestimonialRequest {
            author_name: " Dr Lee ".to_string(),
            author_role: "A&E Consultant".to_string(),
            quote: "The card told us everything we needed in seconds.".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert!(!created.is_approved);
    assert_eq!(created.author_name, "Dr Lee");

    // Unapproved testimonials stay off the public list (and the empty list is cached).
    let Json(public) = site::list_testimonials(State(ctx.state.clone())).await.unwrap();
    assert!(public.is_empty());

    admin::set_testimonial_approval(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(created.id),
        AppJson(TestimonialApprovalRequest { is_approved: true }),
    )
    .await
    .unwrap();

    let Json(public) = site::list_testimonials(State(ctx.state.clone())).await.unwrap();
    assert_eq!(public.len(), 1);

    let status = admin::delete_testimonial(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(created.id),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let Json(public) = site::list_testimonials(State(ctx.state.clone())).await.unwrap();
    assert!(public.is_empty());

    let err = admin::delete_testimonial(
        auth(&admin_user),
        State(ctx.state.clone()),
        client_ip(),
        AppPath(created.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
async fn test_stats_are_cached_until_invalidated() {
    let ctx = TestContext::new();
    ctx.seed_user(UserRole::Admin, "admin@example.com").await;

    let Json(before) = admin::get_admin_stats(State(ctx.state.clone())).await.unwrap();
    assert_eq!(before.total_users, 1);

    // Seeding bypasses the handlers, so the cached figure is served.
    ctx.seed_user(UserRole::Patient, "pat@example.com").await;
    let Json(cached) = admin::get_admin_stats(State(ctx.state.clone())).await.unwrap();
    assert_eq!(cached.total_users, 1);

    ctx.state.cache.invalidate_stats();
    let Json(fresh) = admin::get_admin_stats(State(ctx.state.clone())).await.unwrap();
    assert_eq!(fresh.total_users, 2);
    assert_eq!(fresh, ctx.repo.get_stats().await.unwrap());
}
