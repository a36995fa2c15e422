//! Fixed-window rate limiting keyed by client address and route.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::{config::AppConfig, error::AppError, extract::client_ip_from_parts};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// RateLimiter
///
/// Shared, cloneable limiter. Each `(ip, path)` key owns one window; the DashMap entry
/// lock makes the read-increment-write of a key atomic, so concurrent requests cannot
/// both take the last slot.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_attempts,
            window,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_max_attempts,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Counts one attempt for `key`. Returns the seconds to wait when the window is full.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_attempts {
            let remaining = self.window.saturating_sub(elapsed);
            return Err(remaining.as_secs_f64().ceil().max(1.0) as u64);
        }

        entry.count += 1;
        Ok(())
    }

    /// Drops windows that have run out. Called periodically from a background task.
    pub fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }

    pub fn purge_expired_at(&self, now: Instant) {
        let window = self.window;
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// rate_limit
///
/// Route layer for the public form endpoints. Keys on the client address and the
/// matched route template, so each form has its own window per client.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let ip = client_ip_from_parts(&parts);
    let path = parts
        .extensions
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let key = format!("{ip}|{path}");

    if let Err(retry_after_secs) = limiter.check(&key) {
        tracing::warn!(client = %ip, %path, retry_after_secs, "rate limit exceeded");
        return Err(AppError::RateLimited { retry_after_secs });
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}
