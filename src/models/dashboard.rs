use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use super::{AuditEntry, CardRequest, PatientProfile};

/// AdminDashboardStats
///
/// Output schema for `GET /admin/stats` and the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub nhs_users: i64,
    pub patients: i64,
    pub family_members: i64,
    pub admins: i64,
    pub active_profiles: i64,
    pub pending_card_requests: i64,
    pub open_support_messages: i64,
    pub new_enquiries: i64,
}

/// Dashboard
///
/// The role-specific landing payload for `GET /dashboard`, tagged by `role`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "role", rename_all = "snake_case")]
#[ts(export)]
pub enum Dashboard {
    Patient {
        profile: Option<PatientProfile>,
        card_requests: Vec<CardRequest>,
    },
    Family {
        profile: Option<PatientProfile>,
        card_requests: Vec<CardRequest>,
    },
    NhsUser {
        active_profiles: i64,
        recent_views: Vec<AuditEntry>,
    },
    Admin {
        stats: AdminDashboardStats,
    },
}
