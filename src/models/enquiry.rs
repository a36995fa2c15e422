use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

text_enum! {
    /// The kind of organisation asking to onboard.
    OrganisationType {
        NhsTrust => "nhs_trust",
        GpPractice => "gp_practice",
        CareHome => "care_home",
        Hospice => "hospice",
        Other => "other",
    }
}

text_enum! {
    EnquiryStatus {
        New => "new",
        Contacted => "contacted",
        Onboarded => "onboarded",
        Declined => "declined",
    }
}

/// OnboardingEnquiry
///
/// An organisation's request to start using Know My Patient, captured from the public
/// onboarding form and worked through by admins.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct OnboardingEnquiry {
    pub id: Uuid,
    pub organisation_name: String,
    #[sqlx(try_from = "String")]
    pub organisation_type: OrganisationType,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub estimated_users: Option<i32>,
    pub message: String,
    #[sqlx(try_from = "String")]
    pub status: EnquiryStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateEnquiryRequest {
    pub organisation_name: String,
    pub organisation_type: OrganisationType,
    pub contact_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub estimated_users: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateEnquiryStatusRequest {
    pub status: EnquiryStatus,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EnquiryFilter {
    pub status: Option<EnquiryStatus>,
}
