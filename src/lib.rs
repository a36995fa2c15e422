use std::{any::Any, sync::Arc};

use axum::{
    Json, Router,
    extract::FromRef,
    http::{HeaderName, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
};
use serde_json::json;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod security;
pub mod validation;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};
use crate::middleware::security_headers;

// --- Public Re-exports ---

pub use cache::AppCache;
pub use config::AppConfig;
pub use error::AppError;
pub use mail::{LogMailer, MailerState, MockMailer, SmtpMailer};
pub use middleware::RateLimiter;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json` and browsable
/// through `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::site::health, handlers::site::csrf_token, handlers::site::list_testimonials,
        handlers::auth::register_user, handlers::auth::verify_email, handlers::auth::login,
        handlers::auth::get_me, handlers::password::forgot_password,
        handlers::password::reset_password, handlers::forms::submit_onboarding,
        handlers::forms::submit_support, handlers::dashboard::get_dashboard,
        handlers::patients::create_profile, handlers::patients::get_my_profile,
        handlers::patients::update_profile, handlers::patients::deactivate_profile,
        handlers::patients::search_profiles, handlers::patients::view_profile,
        handlers::cards::create_card_request, handlers::cards::get_my_card_requests,
        handlers::admin::get_admin_stats, handlers::admin::list_users,
        handlers::admin::update_user_role, handlers::admin::update_user_active,
        handlers::admin::list_card_requests, handlers::admin::update_card_request_status,
        handlers::admin::list_enquiries, handlers::admin::update_enquiry_status,
        handlers::admin::list_support_messages, handlers::admin::update_support_status,
        handlers::admin::get_audit_log, handlers::admin::list_all_testimonials,
        handlers::admin::create_testimonial, handlers::admin::set_testimonial_approval,
        handlers::admin::delete_testimonial
    ),
    components(
        schemas(
            handlers::site::HealthResponse, handlers::site::CsrfTokenResponse,
            models::MessageResponse, models::UserRole, models::UserResponse,
            models::RegisterRequest, models::RegisterResponse, models::LoginRequest,
            models::LoginResponse, models::ForgotPasswordRequest, models::ResetPasswordRequest,
            models::UpdateRoleRequest, models::UpdateActiveRequest,
            models::PatientProfile, models::PatientProfileInput,
            models::UpdatePatientProfileRequest, models::CardRequest,
            models::CardRequestStatus, models::CreateCardRequest,
            models::UpdateCardStatusRequest, models::OnboardingEnquiry,
            models::OrganisationType, models::EnquiryStatus, models::CreateEnquiryRequest,
            models::UpdateEnquiryStatusRequest, models::SupportMessage, models::SupportStatus,
            models::CreateSupportRequest, models::UpdateSupportStatusRequest,
            models::Testimonial, models::CreateTestimonialRequest,
            models::TestimonialApprovalRequest, models::AuditEntry, models::AuditAction,
            models::AdminDashboardStats, models::Dashboard,
        )
    ),
    tags(
        (name = "know-my-patient", description = "Know My Patient API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state behind every route. Everything in it is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Outgoing email: SMTP in production, log or mock otherwise.
    pub mailer: MailerState,
    pub config: AppConfig,
    /// Shared by every public form route.
    pub limiter: RateLimiter,
    pub cache: Arc<AppCache>,
}

impl AppState {
    /// Builds the state with a limiter sized from `config` and an empty cache.
    pub fn new(repo: RepositoryState, mailer: MailerState, config: AppConfig) -> Self {
        Self {
            limiter: RateLimiter::from_config(&config),
            cache: Arc::new(AppCache::new()),
            repo,
            mailer,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for RateLimiter {
    fn from_ref(app_state: &AppState) -> RateLimiter {
        app_state.limiter.clone()
    }
}

/// create_router
///
/// Assembles the routing tree and the per-group access layers, then hands the result
/// to `apply_global_layers`.
pub fn create_router(state: AppState) -> Router {
    let production = state.config.is_production();

    let api_router = Router::new()
        // Public routes. Form submissions carry their own CSRF and rate-limit layers.
        .merge(public::public_routes(&state))
        // Authenticated routes: 401 unless a valid bearer token resolves to an active user.
        .merge(
            authenticated::authenticated_routes().route_layer(from_fn_with_state(
                state.clone(),
                auth::auth_middleware,
            )),
        )
        // Admin routes: authenticated first (outer), then the role gate (inner).
        .nest(
            "/admin",
            admin::admin_routes()
                .route_layer(from_fn_with_state(
                    state.clone(),
                    auth::require_admin,
                ))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    auth::auth_middleware,
                )),
        )
        .with_state(state);

    // Swagger UI needs its own scripts and styles; its policy is set before the strict one.
    let docs = security_headers::docs_policy(
        SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi())
            .into(),
    );

    apply_global_layers(api_router.merge(docs), production)
}

/// apply_global_layers
///
/// Wraps a finished router, innermost first: panic recovery, hardening headers,
/// request ids and tracing, then CORS. A panic's 500 still carries the headers.
pub fn apply_global_layers(router: Router, production: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(AnyOrigin)
        .allow_origin(AnyOrigin)
        .allow_headers(AnyOrigin);

    let x_request_id = HeaderName::from_static("x-request-id");

    let recovering = router.layer(CatchPanicLayer::custom(panic_response));
    let hardened = security_headers::apply(recovering, production);

    hardened
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// One `http_request` span per request, correlated by `x-request-id`. `user_id` is
/// filled in by `auth_middleware` once the caller is known.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
        user_id = tracing::field::Empty,
    )
}

/// Turns a handler panic into the standard JSON 500 body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(%detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": { "code": "internal_error", "message": "An internal error occurred" }
        })),
    )
        .into_response()
}
