//! Request, response and row types for every table the service owns.
//!
//! Row structs derive `FromRow` and are returned straight to clients where nothing
//! sensitive is stored on them. `User` is the exception and goes out as `UserResponse`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Declares a closed set of values stored as TEXT in Postgres and sent as snake_case
/// strings in JSON. Row structs decode them with `#[sqlx(try_from = "String")]`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
        #[ts(export)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value: {other}", stringify!($name))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

pub mod audit;
pub mod card_request;
pub mod dashboard;
pub mod enquiry;
pub mod patient;
pub mod support;
pub mod testimonial;
pub mod user;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditQuery, NewAuditEntry};
pub use card_request::{
    CardRequest, CardRequestFilter, CardRequestStatus, CreateCardRequest, UpdateCardStatusRequest,
};
pub use dashboard::{AdminDashboardStats, Dashboard};
pub use enquiry::{
    CreateEnquiryRequest, EnquiryFilter, EnquiryStatus, OnboardingEnquiry, OrganisationType,
    UpdateEnquiryStatusRequest,
};
pub use patient::{
    PatientProfile, PatientProfileInput, PatientSearchQuery, UpdatePatientProfileRequest,
};
pub use support::{
    CreateSupportRequest, SupportFilter, SupportMessage, SupportStatus, UpdateSupportStatusRequest,
};
pub use testimonial::{CreateTestimonialRequest, Testimonial, TestimonialApprovalRequest};
pub use user::{
    ForgotPasswordRequest, LoginRequest, LoginResponse, NewUser, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, UpdateActiveRequest, UpdateRoleRequest, User,
    UserFilter, UserResponse, UserRole,
};

/// MessageResponse
///
/// The JSON stand-in for a one-time flash message: a short human-readable confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
