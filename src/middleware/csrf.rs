//! Stateless CSRF tokens.
//!
//! A token is `<nonce>.<issued_unix>.<mac>` where `mac` is HMAC-SHA256 over
//! `<nonce>.<issued_unix>` with `CSRF_SECRET`. Nothing is stored server side; a token is
//! valid until it is two hours old.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{config::AppConfig, error::AppError};

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const TOKEN_TTL_SECS: i64 = 2 * 60 * 60;
// Tolerated clock skew for tokens stamped slightly in the future.
const MAX_SKEW_SECS: i64 = 60;

fn keyed(secret: &str) -> Result<HmacSha256, AppError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("invalid CSRF key: {e}")))
}

pub fn issue_token(secret: &str) -> Result<String, AppError> {
    issue_token_at(secret, Utc::now().timestamp())
}

pub fn issue_token_at(secret: &str, issued: i64) -> Result<String, AppError> {
    let nonce: [u8; 16] = rand::random();
    let payload = format!("{}.{issued}", hex::encode(nonce));
    let mut mac = keyed(secret)?;
    mac.update(payload.as_bytes());
    Ok(format!("{payload}.{}", hex::encode(mac.finalize().into_bytes())))
}

pub fn verify_token(secret: &str, token: &str) -> bool {
    verify_token_at(secret, token, Utc::now().timestamp())
}

pub fn verify_token_at(secret: &str, token: &str, now: i64) -> bool {
    let mut pieces = token.trim().splitn(3, '.');
    let (Some(nonce), Some(issued), Some(signature)) = (pieces.next(), pieces.next(), pieces.next())
    else {
        return false;
    };
    let Ok(issued_at) = issued.parse::<i64>() else {
        return false;
    };
    if nonce.is_empty() || now - issued_at > TOKEN_TTL_SECS || issued_at - now > MAX_SKEW_SECS {
        return false;
    }
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = keyed(secret) else {
        return false;
    };
    mac.update(format!("{nonce}.{issued}").as_bytes());
    // verify_slice compares in constant time.
    mac.verify_slice(&signature).is_ok()
}

/// csrf_guard
///
/// Route layer for the public form endpoints. Safe methods pass through; anything that
/// changes state must carry a valid `X-CSRF-Token` header.
pub async fn csrf_guard(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let safe = matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    );
    if !safe {
        let valid = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|token| verify_token(&config.csrf_secret, token));
        if !valid {
            tracing::warn!(path = %request.uri().path(), "CSRF token rejected");
            return Err(AppError::CsrfMismatch);
        }
    }
    Ok(next.run(request).await)
}
