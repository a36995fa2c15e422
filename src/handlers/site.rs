use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    AppState, cache::AppCache, error::AppError, middleware::csrf, models::Testimonial,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// "up" or "down".
    pub database: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CsrfTokenResponse {
    pub token: String,
}

/// health
///
/// [Public Route] Liveness plus a database round trip. Load balancers treat the 503 as
/// "take me out of rotation".
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database, code) = match state.repo.ping().await {
        Ok(()) => ("ok", "up", StatusCode::OK),
        Err(e) => {
            tracing::error!(error = %e, "health check: database unreachable");
            ("degraded", "down", StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            database: database.to_string(),
            timestamp: Utc::now(),
        }),
    )
}

/// csrf_token
///
/// [Public Route] Issues a token for the `X-CSRF-Token` header of the public forms.
#[utoipa::path(
    get,
    path = "/csrf-token",
    responses((status = 200, description = "Fresh CSRF token", body = CsrfTokenResponse))
)]
pub async fn csrf_token(State(state): State<AppState>) -> Result<Json<CsrfTokenResponse>, AppError> {
    let token = csrf::issue_token(&state.config.csrf_secret)?;
    Ok(Json(CsrfTokenResponse { token }))
}

/// list_testimonials
///
/// [Public Route] Approved testimonials for the landing page, served from the cache.
#[utoipa::path(
    get,
    path = "/testimonials",
    responses((status = 200, description = "Approved testimonials", body = [Testimonial]))
)]
pub async fn list_testimonials(
    State(state): State<AppState>,
) -> Result<Json<Vec<Testimonial>>, AppError> {
    let repo = state.repo.clone();
    let testimonials = state
        .cache
        .testimonials
        .get_or_try_insert_with(AppCache::APPROVED_TESTIMONIALS, || async move {
            repo.list_testimonials(true).await
        })
        .await?;
    Ok(Json(testimonials))
}
