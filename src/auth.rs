use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::{User, UserRole},
    repository::RepositoryState,
};

/// Claims
///
/// The payload signed into every session JWT. The role is informational only; the
/// extractor always re-reads it from the database.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID.
    pub sub: Uuid,
    pub role: UserRole,
    /// Expiration Time (exp): seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// issue_token
///
/// Signs an HS256 session token for `user`. Returns the token and its lifetime in seconds.
pub fn issue_token(user: &User, config: &AppConfig) -> Result<(String, i64), AppError> {
    let now = Utc::now().timestamp();
    let ttl = config.jwt_ttl_minutes * 60;
    let claims = Claims {
        sub: user.id,
        role: user.role,
        iat: now as usize,
        exp: (now + ttl) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))?;
    Ok((token, ttl))
}

/// decode_token
///
/// Verifies signature and expiry. Every failure collapses to `Unauthorized`; the kind is
/// only logged.
pub fn decode_token(token: &str, config: &AppConfig) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // No grace period: an expired token is rejected immediately.
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
            other => tracing::debug!(?other, "rejected invalid token"),
        }
        AppError::Unauthorized
    })
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an argument
/// and use `require_role` for RBAC.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
    pub email: String,
    pub name: String,
}

impl AuthUser {
    /// Returns 403 unless the user holds one of `roles`.
    pub fn require_role(&self, roles: &[UserRole]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "You do not have permission to perform this action.",
            ))
        }
    }

    /// Patients and family members own profiles and order cards for them.
    pub fn require_profile_owner(&self) -> Result<(), AppError> {
        if self.role.manages_profile() {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "Only patients and family members can manage a patient profile.",
            ))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse an identity already resolved by `auth_middleware` for this request.
/// 2. Otherwise read `Authorization: Bearer <jwt>` and validate it.
/// 3. Re-load the user so deleted or deactivated accounts lose access at once.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = decode_token(token.trim(), &config)?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser::from(&user))
    }
}

/// `Option<AuthUser>` for routes that serve anonymous and signed-in callers alike. A
/// missing or unusable token yields `None` instead of a rejection.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(<AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .ok())
    }
}

/// auth_middleware
///
/// Guards the authenticated and admin routers. A failed extraction short-circuits with
/// 401; on success the identity is stored in the request extensions so handlers do not
/// hit the database a second time.
pub async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    tracing::Span::current().record("user_id", tracing::field::display(auth_user.id));
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// require_admin
///
/// Layered on the `/admin` router after `auth_middleware`.
pub async fn require_admin(
    auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !auth_user.is_admin() {
        tracing::warn!(user_id = %auth_user.id, role = %auth_user.role, "admin route refused");
        return Err(AppError::forbidden("Administrator access is required."));
    }
    Ok(next.run(request).await)
}
