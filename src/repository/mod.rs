use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::RepoResult,
    models::{
        AdminDashboardStats, AuditEntry, AuditFilter, CardRequest, CardRequestStatus,
        CreateEnquiryRequest, CreateSupportRequest, CreateTestimonialRequest, EnquiryStatus,
        NewAuditEntry, NewUser, OnboardingEnquiry, PatientProfile, PatientProfileInput,
        SupportMessage, SupportStatus, Testimonial, UpdatePatientProfileRequest, User, UserRole,
    },
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Upper bound on rows returned by a patient search.
pub const SEARCH_LIMIT: i64 = 25;

/// Repository Trait
///
/// The contract for every persistence operation. Handlers only ever see
/// `Arc<dyn Repository>`, so Postgres in production and the in-memory store in tests
/// are interchangeable.
///
/// Methods that look a row up return `Ok(None)` when it does not exist; `Err` is kept
/// for store failures and for uniqueness conflicts (`AppError::Conflict`).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Inserts an unverified, active user. A taken email is a `Conflict`.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    // `email` must already be lower-cased.
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self, role: Option<UserRole>) -> RepoResult<Vec<User>>;
    /// Marks the owner of `token_hash` verified and clears the token. Single use.
    async fn verify_email(&self, token_hash: &str) -> RepoResult<Option<User>>;
    async fn record_login(&self, id: Uuid) -> RepoResult<()>;
    async fn set_user_role(&self, id: Uuid, role: UserRole) -> RepoResult<Option<User>>;
    async fn set_user_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>>;

    // --- Password resets ---
    async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// In one transaction: consumes the unused, unexpired token, burns every other
    /// outstanding token of the same user and stores the new password hash. Returns the
    /// user id, or `None` when the token is unknown, used or expired.
    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>>;

    // --- Patient profiles ---
    /// Creates the owner's profile with a fresh public uid. `Conflict` when the owner
    /// already has an active profile.
    async fn create_patient_profile(
        &self,
        owner_id: Uuid,
        input: &PatientProfileInput,
    ) -> RepoResult<PatientProfile>;
    async fn get_patient_profile_by_uid(&self, uid: &str) -> RepoResult<Option<PatientProfile>>;
    async fn get_active_profile_for_owner(&self, owner_id: Uuid)
    -> RepoResult<Option<PatientProfile>>;
    /// Owner-only partial update of an active profile.
    async fn update_patient_profile(
        &self,
        uid: &str,
        owner_id: Uuid,
        update: &UpdatePatientProfileRequest,
    ) -> RepoResult<Option<PatientProfile>>;
    /// Owner-only soft delete. False when nothing matched.
    async fn deactivate_patient_profile(&self, uid: &str, owner_id: Uuid) -> RepoResult<bool>;
    /// Active profiles whose name contains `query`, or whose uid or NHS number equals it.
    async fn search_patient_profiles(&self, query: &str, limit: i64)
    -> RepoResult<Vec<PatientProfile>>;

    // --- Card requests ---
    /// `Conflict` when the profile already has an open request.
    async fn create_card_request(
        &self,
        profile_id: Uuid,
        requested_by: Uuid,
        delivery_address: &str,
        quantity: i32,
    ) -> RepoResult<CardRequest>;
    async fn get_card_request(&self, id: Uuid) -> RepoResult<Option<CardRequest>>;
    async fn list_card_requests_for_user(&self, user_id: Uuid) -> RepoResult<Vec<CardRequest>>;
    async fn list_card_requests(
        &self,
        status: Option<CardRequestStatus>,
    ) -> RepoResult<Vec<CardRequest>>;
    /// Compare-and-set on `status`: applies only while the row is still `from`.
    /// Returns `None` when another writer got there first.
    async fn update_card_request_status(
        &self,
        id: Uuid,
        from: CardRequestStatus,
        to: CardRequestStatus,
        admin_notes: Option<&str>,
    ) -> RepoResult<Option<CardRequest>>;

    // --- Onboarding enquiries ---
    async fn create_enquiry(&self, req: &CreateEnquiryRequest) -> RepoResult<OnboardingEnquiry>;
    async fn list_enquiries(&self, status: Option<EnquiryStatus>)
    -> RepoResult<Vec<OnboardingEnquiry>>;
    async fn set_enquiry_status(
        &self,
        id: Uuid,
        status: EnquiryStatus,
    ) -> RepoResult<Option<OnboardingEnquiry>>;

    // --- Support ---
    async fn create_support_message(
        &self,
        req: &CreateSupportRequest,
        user_id: Option<Uuid>,
    ) -> RepoResult<SupportMessage>;
    async fn list_support_messages(
        &self,
        status: Option<SupportStatus>,
    ) -> RepoResult<Vec<SupportMessage>>;
    async fn set_support_status(
        &self,
        id: Uuid,
        status: SupportStatus,
    ) -> RepoResult<Option<SupportMessage>>;

    // --- Audit log ---
    async fn record_audit(&self, entry: NewAuditEntry) -> RepoResult<()>;
    /// Newest first.
    async fn list_audit_entries(&self, filter: &AuditFilter) -> RepoResult<Vec<AuditEntry>>;

    // --- Testimonials ---
    async fn list_testimonials(&self, approved_only: bool) -> RepoResult<Vec<Testimonial>>;
    async fn create_testimonial(&self, req: &CreateTestimonialRequest) -> RepoResult<Testimonial>;
    async fn set_testimonial_approved(
        &self,
        id: Uuid,
        is_approved: bool,
    ) -> RepoResult<Option<Testimonial>>;
    async fn delete_testimonial(&self, id: Uuid) -> RepoResult<bool>;

    // --- Health & stats ---
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats>;
    async fn ping(&self) -> RepoResult<()>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
