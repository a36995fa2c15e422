use crate::{
    AppState,
    handlers::{auth, cards, dashboard, patients},
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`; the router is wrapped in
/// `auth_middleware` in `create_router`. Role checks beyond "signed in" happen in the
/// handlers via `AuthUser::require_role`, and ownership checks against the profile owner.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(auth::get_me))
        // GET /dashboard
        // Payload shape depends on the caller's role.
        .route("/dashboard", get(dashboard::get_dashboard))
        // --- Patient profiles ---
        // POST /patients
        // Patients and family members create the profile they own. One active at a time.
        .route("/patients", post(patients::create_profile))
        // GET /patients/mine
        .route("/patients/mine", get(patients::get_my_profile))
        // GET /patients/search?q=
        // Clinical lookup for NHS staff and admins.
        .route("/patients/search", get(patients::search_profiles))
        // PUT/DELETE /patients/{uid}
        // Owner-only partial update and deactivation.
        .route(
            "/patients/{uid}",
            put(patients::update_profile).delete(patients::deactivate_profile),
        )
        // GET /patient/profile/{uid}
        // The page a clinician reaches by scanning a card. Every view is audited.
        .route("/patient/profile/{uid}", get(patients::view_profile))
        // --- Printed cards ---
        .route("/card-requests", post(cards::create_card_request))
        .route("/card-requests/mine", get(cards::get_my_card_requests))
}
