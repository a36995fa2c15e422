use axum::{Json, extract::State, http::StatusCode};

use super::{trimmed, trimmed_opt};
use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::AppJson,
    mail,
    models::{CreateEnquiryRequest, CreateSupportRequest, MessageResponse},
    validation::{self, MAX_NAME_LEN, MAX_SUBJECT_LEN, MAX_TEXT_LEN, Validator},
};

const MAX_ESTIMATED_USERS: i64 = 1_000_000;

/// submit_onboarding
///
/// [Public Route] An organisation asks to start using the service. Stored for the admin
/// queue; the admin notification address is told about it.
#[utoipa::path(
    post,
    path = "/onboarding",
    request_body = CreateEnquiryRequest,
    responses(
        (status = 201, description = "Enquiry received", body = MessageResponse),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Too many submissions")
    )
)]
pub async fn submit_onboarding(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateEnquiryRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let req = CreateEnquiryRequest {
        organisation_name: trimmed(&payload.organisation_name),
        organisation_type: payload.organisation_type,
        contact_name: trimmed(&payload.contact_name),
        email: validation::normalise_email(&payload.email),
        phone: trimmed_opt(payload.phone.as_deref()),
        estimated_users: payload.estimated_users,
        message: trimmed(&payload.message),
    };

    let mut v = Validator::new();
    v.required("organisation_name", &req.organisation_name)
        .max_len("organisation_name", &req.organisation_name, MAX_NAME_LEN)
        .required("contact_name", &req.contact_name)
        .max_len("contact_name", &req.contact_name, MAX_NAME_LEN)
        .email("email", &req.email)
        .phone("phone", req.phone.as_deref())
        .required("message", &req.message)
        .max_len("message", &req.message, MAX_TEXT_LEN);
    if let Some(users) = req.estimated_users {
        v.range("estimated_users", users.into(), 1, MAX_ESTIMATED_USERS);
    }
    v.finish()?;

    let enquiry = state.repo.create_enquiry(&req).await?;
    tracing::info!(enquiry_id = %enquiry.id, organisation_type = %enquiry.organisation_type, "onboarding enquiry received");
    state.cache.invalidate_stats();

    if let Some(admin) = &state.config.admin_notify_email {
        mail::deliver(
            &state.mailer,
            mail::admin_new_enquiry(admin, &enquiry.organisation_name, &enquiry.contact_name, &enquiry.email),
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Thank you for your enquiry. Our team will be in touch shortly.",
        )),
    ))
}

/// submit_support
///
/// [Public Route] Raises a support ticket. A signed-in caller's account is linked to
/// the ticket; anonymous submissions are accepted too. The sender gets an
/// acknowledgement and the admin address a notification.
#[utoipa::path(
    post,
    path = "/support",
    request_body = CreateSupportRequest,
    responses(
        (status = 201, description = "Ticket raised", body = MessageResponse),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Too many submissions")
    )
)]
pub async fn submit_support(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateSupportRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let req = CreateSupportRequest {
        name: trimmed(&payload.name),
        email: validation::normalise_email(&payload.email),
        subject: trimmed(&payload.subject),
        message: trimmed(&payload.message),
    };

    let mut v = Validator::new();
    v.required("name", &req.name)
        .max_len("name", &req.name, MAX_NAME_LEN)
        .email("email", &req.email)
        .required("subject", &req.subject)
        .max_len("subject", &req.subject, MAX_SUBJECT_LEN)
        .required("message", &req.message)
        .max_len("message", &req.message, MAX_TEXT_LEN);
    v.finish()?;

    let ticket = state
        .repo
        .create_support_message(&req, auth_user.map(|u| u.id))
        .await?;
    tracing::info!(ticket_id = %ticket.id, linked = ticket.user_id.is_some(), "support ticket raised");
    state.cache.invalidate_stats();

    mail::deliver(
        &state.mailer,
        mail::support_acknowledgement(&ticket.email, &ticket.name, &ticket.subject),
    )
    .await;
    if let Some(admin) = &state.config.admin_notify_email {
        mail::deliver(
            &state.mailer,
            mail::admin_new_ticket(admin, &ticket.name, &ticket.email, &ticket.subject),
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Thank you for contacting us. We will respond as soon as possible.",
        )),
    ))
}
