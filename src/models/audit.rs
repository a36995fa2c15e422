use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

text_enum! {
    /// AuditAction
    ///
    /// Every security- or data-relevant event the service records.
    AuditAction {
        UserRegistered => "user_registered",
        EmailVerified => "email_verified",
        LoginSucceeded => "login_succeeded",
        LoginFailed => "login_failed",
        PasswordResetRequested => "password_reset_requested",
        PasswordResetCompleted => "password_reset_completed",
        ProfileCreated => "profile_created",
        ProfileUpdated => "profile_updated",
        ProfileDeactivated => "profile_deactivated",
        ProfileViewed => "profile_viewed",
        CardRequested => "card_requested",
        CardStatusChanged => "card_status_changed",
        UserRoleChanged => "user_role_changed",
        UserStatusChanged => "user_status_changed",
        EnquiryStatusChanged => "enquiry_status_changed",
        SupportStatusChanged => "support_status_changed",
        TestimonialChanged => "testimonial_changed",
    }
}

/// AuditEntry
///
/// One row of the append-only `audit_log` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AuditEntry {
    pub id: i64,
    // None for anonymous actions such as a failed login against an unknown email.
    pub user_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub action: AuditAction,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// NewAuditEntry
///
/// Builder for an audit row:
///
/// ```ignore
/// NewAuditEntry::new(AuditAction::ProfileViewed)
///     .by(user.id)
///     .target("patient_profile", &profile.uid)
///     .ip(&client_ip);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            user_id: None,
            action,
            target_type: None,
            target_id: None,
            ip_address: None,
            details: None,
        }
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn target(mut self, target_type: &str, target_id: impl ToString) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Query parameters for `GET /admin/audit-log`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    /// Defaults to 100, capped at 500.
    pub limit: Option<i64>,
}

/// Normalised audit filter handed to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub limit: i64,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 500;
}

impl From<AuditQuery> for AuditFilter {
    fn from(query: AuditQuery) -> Self {
        Self {
            user_id: query.user_id,
            action: query.action,
            limit: query
                .limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }
}
