use crate::{AppState, handlers::admin};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Nested at `/admin`. `create_router` wraps it in `auth_middleware` followed by
/// `require_admin`, so no handler here runs for a non-admin caller.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        .route("/stats", get(admin::get_admin_stats))
        // --- Accounts ---
        // GET /admin/users?role=
        .route("/users", get(admin::list_users))
        // PUT /admin/users/{id}/role
        .route("/users/{id}/role", put(admin::update_user_role))
        // PUT /admin/users/{id}/active
        .route("/users/{id}/active", put(admin::update_user_active))
        // --- Card fulfilment ---
        .route("/card-requests", get(admin::list_card_requests))
        // PUT /admin/card-requests/{id}/status
        // pending -> approved -> printed -> dispatched, with rejection before printing.
        .route(
            "/card-requests/{id}/status",
            put(admin::update_card_request_status),
        )
        // --- Onboarding & support queues ---
        .route("/onboarding", get(admin::list_enquiries))
        .route("/onboarding/{id}/status", put(admin::update_enquiry_status))
        .route("/support", get(admin::list_support_messages))
        .route("/support/{id}/status", put(admin::update_support_status))
        // GET /admin/audit-log?user_id=&action=&limit=
        .route("/audit-log", get(admin::get_audit_log))
        // --- Testimonials ---
        .route(
            "/testimonials",
            get(admin::list_all_testimonials).post(admin::create_testimonial),
        )
        .route(
            "/testimonials/{id}/approval",
            put(admin::set_testimonial_approval),
        )
        .route(
            "/testimonials/{id}",
            axum::routing::delete(admin::delete_testimonial),
        )
}
