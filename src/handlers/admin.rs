//! Handlers behind `/admin`. The router applies `auth_middleware` and `require_admin`,
//! so every caller here is an authenticated administrator.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use super::{dashboard::cached_stats, trimmed};
use crate::{
    AppState, audit,
    auth::AuthUser,
    error::AppError,
    extract::{AppJson, AppPath, AppQuery, ClientIp},
    mail,
    models::{
        AdminDashboardStats, AuditAction, AuditEntry, AuditFilter, AuditQuery, CardRequest,
        CardRequestFilter, CardRequestStatus, CreateTestimonialRequest, EnquiryFilter,
        NewAuditEntry, OnboardingEnquiry, SupportFilter, SupportMessage, Testimonial,
        TestimonialApprovalRequest, UpdateActiveRequest, UpdateCardStatusRequest,
        UpdateEnquiryStatusRequest, UpdateRoleRequest, UpdateSupportStatusRequest, UserFilter,
        UserResponse,
    },
    validation::{MAX_NAME_LEN, MAX_TEXT_LEN, Validator},
};

// --- Stats & users ---

/// get_admin_stats
///
/// [Admin Route] System counters, cached for 60 seconds.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Dashboard counters", body = AdminDashboardStats),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_admin_stats(
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, AppError> {
    Ok(Json(cached_stats(&state).await?))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    params(UserFilter),
    responses((status = 200, description = "Users, newest first", body = [UserResponse]))
)]
pub async fn list_users(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<UserFilter>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.repo.list_users(filter.role).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// update_user_role
///
/// [Admin Route] Changes another user's role. Admins cannot change their own role, so
/// the last admin cannot lock everyone out by accident.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Attempt to change own role"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn update_user_role(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if id == admin.id {
        return Err(AppError::bad_request("You cannot change your own role."));
    }
    let user = state
        .repo
        .set_user_role(id, payload.role)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::UserRoleChanged)
            .by(admin.id)
            .target("user", id)
            .ip(&ip)
            .details(format!("role set to {}", payload.role)),
    )
    .await;
    state.cache.invalidate_stats();
    tracing::info!(admin_id = %admin.id, user_id = %id, role = %payload.role, "user role changed");

    Ok(Json(user.into()))
}

/// update_user_active
///
/// [Admin Route] Enables or disables an account. A disabled user's existing tokens stop
/// working on the next request. Admins cannot deactivate themselves.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/active",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateActiveRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Attempt to deactivate self"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn update_user_active(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateActiveRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if id == admin.id && !payload.is_active {
        return Err(AppError::bad_request("You cannot deactivate your own account."));
    }
    let user = state
        .repo
        .set_user_active(id, payload.is_active)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::UserStatusChanged)
            .by(admin.id)
            .target("user", id)
            .ip(&ip)
            .details(if payload.is_active { "activated" } else { "deactivated" }),
    )
    .await;

    Ok(Json(user.into()))
}

// --- Card fulfilment ---

#[utoipa::path(
    get,
    path = "/admin/card-requests",
    params(CardRequestFilter),
    responses((status = 200, description = "Card requests, newest first", body = [CardRequest]))
)]
pub async fn list_card_requests(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<CardRequestFilter>,
) -> Result<Json<Vec<CardRequest>>, AppError> {
    Ok(Json(state.repo.list_card_requests(filter.status).await?))
}

/// update_card_request_status
///
/// [Admin Route] Moves a request along the fulfilment pipeline:
///
/// ```text
/// pending  -> approved | rejected
/// approved -> printed  | rejected
/// printed  -> dispatched
/// ```
///
/// The write is conditional on the status read here, so two admins racing on the same
/// request cannot both succeed. The requester is emailed on dispatch.
#[utoipa::path(
    put,
    path = "/admin/card-requests/{id}/status",
    params(("id" = Uuid, Path, description = "Card request ID")),
    request_body = UpdateCardStatusRequest,
    responses(
        (status = 200, description = "Updated request", body = CardRequest),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Illegal transition or concurrent update")
    )
)]
pub async fn update_card_request_status(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateCardStatusRequest>,
) -> Result<Json<CardRequest>, AppError> {
    let current = state
        .repo
        .get_card_request(id)
        .await?
        .ok_or(AppError::NotFound("card request"))?;

    if !current.status.can_transition_to(payload.status) {
        return Err(AppError::InvalidTransition {
            from: current.status.to_string(),
            to: payload.status.to_string(),
        });
    }

    let updated = state
        .repo
        .update_card_request_status(id, current.status, payload.status, payload.admin_notes.as_deref())
        .await?
        .ok_or_else(|| {
            AppError::conflict("This card request was updated by someone else. Reload and try again.")
        })?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::CardStatusChanged)
            .by(admin.id)
            .target("card_request", id)
            .ip(&ip)
            .details(format!("{} -> {}", current.status, updated.status)),
    )
    .await;
    state.cache.invalidate_stats();

    if updated.status == CardRequestStatus::Dispatched {
        match state.repo.get_user(updated.requested_by).await {
            Ok(Some(requester)) => {
                mail::deliver(
                    &state.mailer,
                    mail::card_dispatched_email(&requester.email, &requester.name, updated.quantity),
                )
                .await;
            }
            Ok(None) => tracing::warn!(card_request_id = %id, "requester no longer exists"),
            Err(e) => tracing::error!(card_request_id = %id, error = %e, "could not load requester"),
        }
    }

    Ok(Json(updated))
}

// --- Onboarding & support queues ---

#[utoipa::path(
    get,
    path = "/admin/onboarding",
    params(EnquiryFilter),
    responses((status = 200, description = "Enquiries, newest first", body = [OnboardingEnquiry]))
)]
pub async fn list_enquiries(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<EnquiryFilter>,
) -> Result<Json<Vec<OnboardingEnquiry>>, AppError> {
    Ok(Json(state.repo.list_enquiries(filter.status).await?))
}

#[utoipa::path(
    put,
    path = "/admin/onboarding/{id}/status",
    params(("id" = Uuid, Path, description = "Enquiry ID")),
    request_body = UpdateEnquiryStatusRequest,
    responses(
        (status = 200, description = "Updated enquiry", body = OnboardingEnquiry),
        (status = 404, description = "Unknown enquiry")
    )
)]
pub async fn update_enquiry_status(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateEnquiryStatusRequest>,
) -> Result<Json<OnboardingEnquiry>, AppError> {
    let enquiry = state
        .repo
        .set_enquiry_status(id, payload.status)
        .await?
        .ok_or(AppError::NotFound("enquiry"))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::EnquiryStatusChanged)
            .by(admin.id)
            .target("onboarding_enquiry", id)
            .ip(&ip)
            .details(format!("status set to {}", payload.status)),
    )
    .await;
    state.cache.invalidate_stats();

    Ok(Json(enquiry))
}

#[utoipa::path(
    get,
    path = "/admin/support",
    params(SupportFilter),
    responses((status = 200, description = "Support tickets, newest first", body = [SupportMessage]))
)]
pub async fn list_support_messages(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<SupportFilter>,
) -> Result<Json<Vec<SupportMessage>>, AppError> {
    Ok(Json(state.repo.list_support_messages(filter.status).await?))
}

#[utoipa::path(
    put,
    path = "/admin/support/{id}/status",
    params(("id" = Uuid, Path, description = "Support ticket ID")),
    request_body = UpdateSupportStatusRequest,
    responses(
        (status = 200, description = "Updated ticket", body = SupportMessage),
        (status = 404, description = "Unknown ticket")
    )
)]
pub async fn update_support_status(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateSupportStatusRequest>,
) -> Result<Json<SupportMessage>, AppError> {
    let ticket = state
        .repo
        .set_support_status(id, payload.status)
        .await?
        .ok_or(AppError::NotFound("support message"))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::SupportStatusChanged)
            .by(admin.id)
            .target("support_message", id)
            .ip(&ip)
            .details(format!("status set to {}", payload.status)),
    )
    .await;
    state.cache.invalidate_stats();

    Ok(Json(ticket))
}

// --- Audit log ---

/// get_audit_log
///
/// [Admin Route] Newest entries first. `limit` defaults to 100 and is capped at 500.
#[utoipa::path(
    get,
    path = "/admin/audit-log",
    params(AuditQuery),
    responses((status = 200, description = "Audit entries", body = [AuditEntry]))
)]
pub async fn get_audit_log(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let filter = AuditFilter::from(query);
    Ok(Json(state.repo.list_audit_entries(&filter).await?))
}

// --- Testimonials ---

#[utoipa::path(
    get,
    path = "/admin/testimonials",
    responses((status = 200, description = "All testimonials", body = [Testimonial]))
)]
pub async fn list_all_testimonials(
    State(state): State<AppState>,
) -> Result<Json<Vec<Testimonial>>, AppError> {
    Ok(Json(state.repo.list_testimonials(false).await?))
}

/// create_testimonial
///
/// [Admin Route] New testimonials start unapproved and stay off the public site until
/// approved.
#[utoipa::path(
    post,
    path = "/admin/testimonials",
    request_body = CreateTestimonialRequest,
    responses(
        (status = 201, description = "Created", body = Testimonial),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_testimonial(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<CreateTestimonialRequest>,
) -> Result<(StatusCode, Json<Testimonial>), AppError> {
    let req = CreateTestimonialRequest {
        author_name: trimmed(&payload.author_name),
        author_role: trimmed(&payload.author_role),
        quote: trimmed(&payload.quote),
    };

    let mut v = Validator::new();
    v.required("author_name", &req.author_name)
        .max_len("author_name", &req.author_name, MAX_NAME_LEN)
        .required("author_role", &req.author_role)
        .max_len("author_role", &req.author_role, MAX_NAME_LEN)
        .required("quote", &req.quote)
        .max_len("quote", &req.quote, MAX_TEXT_LEN);
    v.finish()?;

    let testimonial = state.repo.create_testimonial(&req).await?;
    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::TestimonialChanged)
            .by(admin.id)
            .target("testimonial", testimonial.id)
            .ip(&ip)
            .details("created"),
    )
    .await;

    Ok((StatusCode::CREATED, Json(testimonial)))
}

#[utoipa::path(
    put,
    path = "/admin/testimonials/{id}/approval",
    params(("id" = Uuid, Path, description = "Testimonial ID")),
    request_body = TestimonialApprovalRequest,
    responses(
        (status = 200, description = "Updated", body = Testimonial),
        (status = 404, description = "Unknown testimonial")
    )
)]
pub async fn set_testimonial_approval(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<TestimonialApprovalRequest>,
) -> Result<Json<Testimonial>, AppError> {
    let testimonial = state
        .repo
        .set_testimonial_approved(id, payload.is_approved)
        .await?
        .ok_or(AppError::NotFound("testimonial"))?;
    state.cache.invalidate_testimonials();

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::TestimonialChanged)
            .by(admin.id)
            .target("testimonial", id)
            .ip(&ip)
            .details(if payload.is_approved { "approved" } else { "unapproved" }),
    )
    .await;

    Ok(Json(testimonial))
}

#[utoipa::path(
    delete,
    path = "/admin/testimonials/{id}",
    params(("id" = Uuid, Path, description = "Testimonial ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown testimonial")
    )
)]
pub async fn delete_testimonial(
    admin: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.repo.delete_testimonial(id).await? {
        return Err(AppError::NotFound("testimonial"));
    }
    state.cache.invalidate_testimonials();

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::TestimonialChanged)
            .by(admin.id)
            .target("testimonial", id)
            .ip(&ip)
            .details("deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
