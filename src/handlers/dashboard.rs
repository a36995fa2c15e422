use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::AuthUser,
    cache::AppCache,
    error::AppError,
    models::{AdminDashboardStats, AuditAction, AuditFilter, Dashboard, UserRole},
};

const RECENT_VIEWS: i64 = 10;

/// Admin stats through the 60 second cache.
pub(crate) async fn cached_stats(state: &AppState) -> Result<AdminDashboardStats, AppError> {
    let repo = state.repo.clone();
    state
        .cache
        .stats
        .get_or_try_insert_with(AppCache::ADMIN_STATS, || async move { repo.get_stats().await })
        .await
}

/// get_dashboard
///
/// [Authenticated Route] The landing payload for the caller's role:
/// patients and family see their profile and card requests, NHS staff their recent
/// profile views, admins the system counters.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Role-specific dashboard", body = Dashboard),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_dashboard(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Dashboard>, AppError> {
    let dashboard = match auth_user.role {
        UserRole::Patient | UserRole::Family => {
            let profile = state.repo.get_active_profile_for_owner(auth_user.id).await?;
            let card_requests = state.repo.list_card_requests_for_user(auth_user.id).await?;
            if auth_user.role == UserRole::Patient {
                Dashboard::Patient {
                    profile,
                    card_requests,
                }
            } else {
                Dashboard::Family {
                    profile,
                    card_requests,
                }
            }
        }
        UserRole::NhsUser => {
            let active_profiles = cached_stats(&state).await?.active_profiles;
            let recent_views = state
                .repo
                .list_audit_entries(&AuditFilter {
                    user_id: Some(auth_user.id),
                    action: Some(AuditAction::ProfileViewed),
                    limit: RECENT_VIEWS,
                })
                .await?;
            Dashboard::NhsUser {
                active_profiles,
                recent_views,
            }
        }
        UserRole::Admin => Dashboard::Admin {
            stats: cached_stats(&state).await?,
        },
    };
    Ok(Json(dashboard))
}
