use axum::{Json, extract::State, http::StatusCode};

use super::trimmed;
use crate::{
    AppState, audit,
    auth::AuthUser,
    error::AppError,
    extract::{AppJson, ClientIp},
    models::{AuditAction, CardRequest, CreateCardRequest, NewAuditEntry},
    validation::{MAX_TEXT_LEN, Validator},
};

pub const MIN_CARD_QUANTITY: i64 = 1;
pub const MAX_CARD_QUANTITY: i64 = 5;

/// create_card_request
///
/// [Authenticated Route] The owner of an active profile orders printed cards. A profile
/// may only have one request in flight (pending, approved or printed).
#[utoipa::path(
    post,
    path = "/card-requests",
    request_body = CreateCardRequest,
    responses(
        (status = 201, description = "Request recorded", body = CardRequest),
        (status = 403, description = "Role cannot own a profile"),
        (status = 404, description = "Caller has no active profile"),
        (status = 409, description = "An open request already exists"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_card_request(
    auth_user: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<CreateCardRequest>,
) -> Result<(StatusCode, Json<CardRequest>), AppError> {
    auth_user.require_profile_owner()?;

    let address = trimmed(&payload.delivery_address);
    let quantity = payload.quantity.unwrap_or(1);

    let mut v = Validator::new();
    v.required("delivery_address", &address)
        .max_len("delivery_address", &address, MAX_TEXT_LEN)
        .range("quantity", quantity.into(), MIN_CARD_QUANTITY, MAX_CARD_QUANTITY);
    v.finish()?;

    let profile = state
        .repo
        .get_active_profile_for_owner(auth_user.id)
        .await?
        .ok_or(AppError::NotFound("patient profile"))?;

    let request = state
        .repo
        .create_card_request(profile.id, auth_user.id, &address, quantity)
        .await?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::CardRequested)
            .by(auth_user.id)
            .target("card_request", request.id)
            .ip(&ip)
            .details(format!("profile {} x{quantity}", profile.uid)),
    )
    .await;
    state.cache.invalidate_stats();

    Ok((StatusCode::CREATED, Json(request)))
}

/// get_my_card_requests
///
/// [Authenticated Route] Requests the caller has made, newest first.
#[utoipa::path(
    get,
    path = "/card-requests/mine",
    responses((status = 200, description = "Caller's card requests", body = [CardRequest]))
)]
pub async fn get_my_card_requests(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CardRequest>>, AppError> {
    Ok(Json(state.repo.list_card_requests_for_user(id).await?))
}
