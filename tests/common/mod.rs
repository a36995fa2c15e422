#![allow(dead_code)]

use axum::{
    body::{Body, to_bytes},
    http::Response,
};
use chrono::{NaiveDate, Utc};
use know_my_patient::{
    AppConfig, AppState, MemoryRepository, MockMailer,
    auth::{AuthUser, issue_token},
    extract::ClientIp,
    models::{PatientProfileInput, User, UserRole},
    repository::RepositoryState,
    security::password,
};
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

pub const PASSWORD: &str = "Sunflower42";
pub const TEST_IP: &str = "203.0.113.7";

// One hash shared by every fixture user; argon2 is deliberately slow.
static PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| password::hash_password(PASSWORD).expect("hashing fixture password"));

/// Everything a test needs to drive handlers or the router, with the concrete
/// in-memory repository and mock mailer kept reachable for assertions.
pub struct TestContext {
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub mailer: MockMailer,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let mailer = MockMailer::new();
        let state = AppState::new(
            repo.clone() as RepositoryState,
            Arc::new(mailer.clone()),
            config,
        );
        Self {
            state,
            repo,
            mailer,
        }
    }

    /// Inserts an active, verified user whose password is [`PASSWORD`].
    pub async fn seed_user(&self, role: UserRole, email: &str) -> User {
        let now = Utc::now();
        self.repo
            .insert_user(User {
                id: Uuid::new_v4(),
                name: format!("{role} user"),
                email: email.to_string(),
                password_hash: PASSWORD_HASH.clone(),
                role,
                is_active: true,
                email_verified_at: Some(now),
                verification_token_hash: None,
                last_login_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
    }

    /// A bearer header value for `user`, signed with this context's secret.
    pub fn bearer(&self, user: &User) -> String {
        let (token, _) = issue_token(user, &self.state.config).expect("signing test token");
        format!("Bearer {token}")
    }
}

pub fn auth(user: &User) -> AuthUser {
    AuthUser::from(user)
}

pub fn client_ip() -> ClientIp {
    ClientIp(TEST_IP.to_string())
}

pub fn profile_input(name: &str) -> PatientProfileInput {
    PatientProfileInput {
        patient_name: name.to_string(),
        preferred_name: Some("Peggy".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1941, 3, 9).expect("valid date"),
        nhs_number: Some("943 476 5919".to_string()),
        communication_needs: Some("Hard of hearing, speak clearly".to_string()),
        allergies: Some("Penicillin".to_string()),
        ..Default::default()
    }
}

/// Pulls the token that follows `marker` out of an email body, e.g. the part after
/// `/verify-email/` or `token=`.
pub fn token_after(body: &str, marker: &str) -> String {
    let start = body.find(marker).expect("marker present in email") + marker.len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("reading response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
