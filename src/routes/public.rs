use crate::{
    AppState,
    handlers::{auth, forms, password, site},
    middleware::{csrf_guard, rate_limit},
};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Split in two:
///
/// - read-only pages (health, CSRF token, testimonials, email verification),
/// - form submissions, which require an `X-CSRF-Token` and are rate limited per client
///   and route. The limiter sits outside the CSRF guard so rejected attempts still count.
pub fn public_routes(state: &AppState) -> Router<AppState> {
    let forms = Router::new()
        // POST /register
        .route("/register", post(auth::register_user))
        // POST /login
        // Issues the bearer JWT used by every authenticated route.
        .route("/login", post(auth::login))
        // POST /password/forgot
        // Same response whether or not the account exists.
        .route("/password/forgot", post(password::forgot_password))
        // POST /password/reset
        .route("/password/reset", post(password::reset_password))
        // POST /onboarding
        // Organisations asking to join the service.
        .route("/onboarding", post(forms::submit_onboarding))
        // POST /support
        // Anonymous or signed-in support tickets.
        .route("/support", post(forms::submit_support))
        .route_layer(middleware::from_fn_with_state(state.clone(), csrf_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        // GET /health
        // Liveness plus a database ping. 503 when the database is unreachable.
        .route("/health", get(site::health))
        // GET /csrf-token
        .route("/csrf-token", get(site::csrf_token))
        // GET /testimonials
        // Approved testimonials only, served from the cache.
        .route("/testimonials", get(site::list_testimonials))
        // GET /verify-email/{token}
        // Target of the link in the verification email.
        .route("/verify-email/{token}", get(auth::verify_email))
        .merge(forms)
}
