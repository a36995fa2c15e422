use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Testimonial
///
/// A quote shown on the public site once an admin approves it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Testimonial {
    pub id: Uuid,
    pub author_name: String,
    // e.g. "Ward Sister, Leeds Teaching Hospitals"
    pub author_role: String,
    pub quote: String,
    pub is_approved: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateTestimonialRequest {
    pub author_name: String,
    pub author_role: String,
    pub quote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TestimonialApprovalRequest {
    pub is_approved: bool,
}
