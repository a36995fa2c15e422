use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;

use super::trimmed;
use crate::{
    AppState, audit,
    auth::{AuthUser, issue_token},
    error::AppError,
    extract::{AppJson, AppPath, ClientIp},
    mail,
    models::{
        AuditAction, LoginRequest, LoginResponse, MessageResponse, NewAuditEntry, NewUser,
        RegisterRequest, RegisterResponse, UserResponse, UserRole,
    },
    security::{password, tokens},
    validation::{self, MAX_NAME_LEN, Validator},
};

/// register_user
///
/// [Public Route] Creates an unverified account and emails a verification link.
///
/// * `admin` can never be self-assigned; admins are promoted by another admin.
/// * `nhs_user` accounts must use an email on one of `NHS_EMAIL_DOMAINS`.
/// * The email is stored lower-cased, so uniqueness is case-insensitive.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered, verification email sent", body = RegisterResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let name = trimmed(&payload.name);
    let email = validation::normalise_email(&payload.email);

    let mut v = Validator::new();
    v.required("name", &name)
        .max_len("name", &name, MAX_NAME_LEN)
        .email("email", &email)
        .password("password", &payload.password);
    if payload.role == UserRole::Admin {
        v.fail("role", "This role cannot be selected at registration.");
    }
    if payload.role == UserRole::NhsUser
        && validation::is_valid_email(&email)
        && !validation::has_allowed_domain(&email, &state.config.nhs_email_domains)
    {
        v.fail("email", "NHS staff must register with an NHS email address.");
    }
    v.finish()?;

    let password_hash = password::hash(payload.password).await?;
    let verification_token = tokens::generate_token();

    let user = state
        .repo
        .create_user(NewUser {
            name,
            email,
            password_hash,
            role: payload.role,
            verification_token_hash: Some(tokens::hash_token(&verification_token)),
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::UserRegistered)
            .by(user.id)
            .target("user", user.id)
            .ip(&ip),
    )
    .await;
    state.cache.invalidate_stats();

    mail::deliver(
        &state.mailer,
        mail::verification_email(&state.config, &user.email, &user.name, &verification_token),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please check your email to verify your account."
                .to_string(),
            user: user.into(),
        }),
    ))
}

/// verify_email
///
/// [Public Route] Consumes the emailed verification token. Tokens are single use.
#[utoipa::path(
    get,
    path = "/verify-email/{token}",
    params(("token" = String, Path, description = "Token from the verification email")),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 404, description = "Unknown or already used token")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(token): AppPath<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state
        .repo
        .verify_email(&tokens::hash_token(&token))
        .await?
        .ok_or(AppError::NotFound("verification token"))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::EmailVerified)
            .by(user.id)
            .target("user", user.id)
            .ip(&ip),
    )
    .await;

    Ok(Json(MessageResponse::new(
        "Your email address has been verified. You can now log in.",
    )))
}

/// login
///
/// [Public Route] Exchanges credentials for a session JWT.
///
/// Credentials are checked before account state, so a disabled or unverified account
/// is only revealed to someone who knows its password. Unknown emails still pay for an
/// argon2 verification against a dummy hash.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled or email not verified"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = validation::normalise_email(&payload.email);
    let user = state.repo.get_user_by_email(&email).await?;

    let stored_hash = user
        .as_ref()
        .map(|u| u.password_hash.clone())
        .unwrap_or_else(|| password::dummy_hash().to_string());
    let password_ok = password::verify(payload.password, stored_hash).await;

    let mut user = match user {
        Some(user) if password_ok => user,
        other => {
            let mut entry = NewAuditEntry::new(AuditAction::LoginFailed).ip(&ip);
            if let Some(user) = &other {
                entry = entry.by(user.id).target("user", user.id);
            }
            audit::record(&state.repo, entry).await;
            tracing::warn!(client = %ip, "failed login attempt");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !user.is_active {
        return Err(AppError::AccountDisabled);
    }
    if !user.is_verified() {
        return Err(AppError::EmailNotVerified);
    }

    let (token, expires_in) = issue_token(&user, &state.config)?;
    state.repo.record_login(user.id).await?;
    user.last_login_at = Some(Utc::now());

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::LoginSucceeded)
            .by(user.id)
            .target("user", user.id)
            .ip(&ip),
    )
    .await;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in,
        user: user.into(),
    }))
}

/// get_me
///
/// [Authenticated Route] The current user's account.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user.into()))
}
