use axum::{Json, extract::State};
use chrono::{Duration, Utc};

use crate::{
    AppState, audit,
    error::AppError,
    extract::{AppJson, ClientIp},
    mail,
    models::{
        AuditAction, ForgotPasswordRequest, MessageResponse, NewAuditEntry, ResetPasswordRequest,
    },
    security::{password, tokens},
    validation::{self, Validator},
};

pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email address, a password reset link has been sent.";

/// forgot_password
///
/// [Public Route] Starts a reset. The answer is identical whether or not the account
/// exists, so the endpoint cannot be used to enumerate users.
#[utoipa::path(
    post,
    path = "/password/forgot",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Always the same message", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = validation::normalise_email(&payload.email);

    if validation::is_valid_email(&email) {
        if let Some(user) = state
            .repo
            .get_user_by_email(&email)
            .await?
            .filter(|u| u.is_active)
        {
            let token = tokens::generate_token();
            let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
            state
                .repo
                .create_password_reset(user.id, &tokens::hash_token(&token), expires_at)
                .await?;

            audit::record(
                &state.repo,
                NewAuditEntry::new(AuditAction::PasswordResetRequested)
                    .by(user.id)
                    .target("user", user.id)
                    .ip(&ip),
            )
            .await;

            mail::deliver(
                &state.mailer,
                mail::password_reset_email(&state.config, &user.email, &user.name, &token),
            )
            .await;
        } else {
            tracing::debug!("password reset requested for unknown or inactive account");
        }
    }

    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

/// reset_password
///
/// [Public Route] Sets a new password with a reset token. A successful reset burns the
/// token and every other outstanding token of the same user.
#[utoipa::path(
    post,
    path = "/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid, used or expired token"),
        (status = 422, description = "Weak password")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let mut v = Validator::new();
    v.required("token", &payload.token)
        .password("password", &payload.password);
    v.finish()?;

    let password_hash = password::hash(payload.password).await?;
    let user_id = state
        .repo
        .complete_password_reset(&tokens::hash_token(&payload.token), &password_hash, Utc::now())
        .await?
        .ok_or_else(|| AppError::bad_request("This password reset link is invalid or has expired."))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::PasswordResetCompleted)
            .by(user_id)
            .target("user", user_id)
            .ip(&ip),
    )
    .await;
    tracing::info!(%user_id, "password reset completed");

    Ok(Json(MessageResponse::new(
        "Your password has been reset. You can now log in.",
    )))
}
