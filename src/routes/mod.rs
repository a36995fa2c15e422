/// Router Module Index
///
/// Routes are split by who may call them. Access control is attached as layers on each
/// group in `create_router`, never left to individual handlers alone.

/// Anonymous routes. The form submissions carry the CSRF guard and the rate limiter.
pub mod public;

/// Routes behind `auth_middleware` (bearer JWT).
pub mod authenticated;

/// Routes behind `auth_middleware` and `require_admin`, nested at `/admin`.
pub mod admin;
