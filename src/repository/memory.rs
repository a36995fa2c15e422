use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, RepoResult},
    models::{
        AdminDashboardStats, AuditEntry, AuditFilter, CardRequest, CardRequestStatus,
        CreateEnquiryRequest, CreateSupportRequest, CreateTestimonialRequest, EnquiryStatus,
        NewAuditEntry, NewUser, OnboardingEnquiry, PatientProfile,
        PatientProfileInput, SupportMessage, SupportStatus, Testimonial,
        UpdatePatientProfileRequest, User, UserRole,
    },
    security::tokens::generate_profile_uid,
};

#[derive(Debug, Clone)]
struct PasswordReset {
    user_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    password_resets: Vec<PasswordReset>,
    profiles: Vec<PatientProfile>,
    card_requests: Vec<CardRequest>,
    enquiries: Vec<OnboardingEnquiry>,
    support: Vec<SupportMessage>,
    audit: Vec<AuditEntry>,
    testimonials: Vec<Testimonial>,
}

/// MemoryRepository
///
/// An in-process `Repository` for tests and demos. Every method runs under one mutex,
/// which gives the same atomicity the database gets from its transactions and
/// partial unique indexes. Insertion order stands in for `created_at` ordering.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    // Flipped by tests to simulate an unreachable database.
    offline: std::sync::atomic::AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ping` (and only `ping`) fail, for health-check tests.
    pub fn set_offline(&self, offline: bool) {
        self.offline
            .store(offline, std::sync::atomic::Ordering::SeqCst);
    }

    /// Inserts a fully formed user, bypassing registration. Test fixture helper.
    pub async fn insert_user(&self, user: User) -> User {
        self.tables.lock().await.users.push(user.clone());
        user
    }
}

fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|row| keep(row)).cloned().collect()
}

#[async_trait]
impl Repository for MemoryRepository {
    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(AppError::conflict("An account with this email already exists."));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            email_verified_at: None,
            verification_token_hash: user.verification_token_hash,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, role: Option<UserRole>) -> RepoResult<Vec<User>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.users, |u| role.is_none_or(|r| u.role == r)))
    }

    async fn verify_email(&self, token_hash: &str) -> RepoResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables
            .users
            .iter_mut()
            .find(|u| u.verification_token_hash.as_deref() == Some(token_hash))
        else {
            return Ok(None);
        };
        let now = Utc::now();
        user.email_verified_at = Some(now);
        user.verification_token_hash = None;
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn record_login(&self, id: Uuid) -> RepoResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_user_role(&self, id: Uuid, role: UserRole) -> RepoResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.is_active = is_active;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    // --- Password resets ---

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.password_resets.iter().any(|r| r.token_hash == token_hash) {
            return Err(AppError::conflict("duplicate reset token"));
        }
        tables.password_resets.push(PasswordReset {
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used_at: None,
        });
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        let mut tables = self.tables.lock().await;
        let Some(user_id) = tables
            .password_resets
            .iter()
            .find(|r| r.token_hash == token_hash && r.used_at.is_none() && r.expires_at > now)
            .map(|r| r.user_id)
        else {
            return Ok(None);
        };

        for reset in tables
            .password_resets
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.used_at.is_none())
        {
            reset.used_at = Some(now);
        }
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
        }
        Ok(Some(user_id))
    }

    // --- Patient profiles ---

    async fn create_patient_profile(
        &self,
        owner_id: Uuid,
        input: &PatientProfileInput,
    ) -> RepoResult<PatientProfile> {
        let mut tables = self.tables.lock().await;
        if tables
            .profiles
            .iter()
            .any(|p| p.owner_id == owner_id && p.is_active)
        {
            return Err(AppError::conflict(
                "An active patient profile already exists for this account.",
            ));
        }

        let mut uid = generate_profile_uid();
        while tables.profiles.iter().any(|p| p.uid == uid) {
            uid = generate_profile_uid();
        }

        let now = Utc::now();
        let profile = PatientProfile {
            id: Uuid::new_v4(),
            uid,
            owner_id,
            patient_name: input.patient_name.clone(),
            preferred_name: input.preferred_name.clone(),
            date_of_birth: input.date_of_birth,
            nhs_number: input.nhs_number.clone(),
            communication_needs: input.communication_needs.clone(),
            mobility_needs: input.mobility_needs.clone(),
            dietary_needs: input.dietary_needs.clone(),
            allergies: input.allergies.clone(),
            likes: input.likes.clone(),
            dislikes: input.dislikes.clone(),
            next_of_kin_name: input.next_of_kin_name.clone(),
            next_of_kin_phone: input.next_of_kin_phone.clone(),
            additional_notes: input.additional_notes.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn get_patient_profile_by_uid(&self, uid: &str) -> RepoResult<Option<PatientProfile>> {
        let tables = self.tables.lock().await;
        Ok(tables.profiles.iter().find(|p| p.uid == uid).cloned())
    }

    async fn get_active_profile_for_owner(
        &self,
        owner_id: Uuid,
    ) -> RepoResult<Option<PatientProfile>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.owner_id == owner_id && p.is_active)
            .cloned())
    }

    async fn update_patient_profile(
        &self,
        uid: &str,
        owner_id: Uuid,
        update: &UpdatePatientProfileRequest,
    ) -> RepoResult<Option<PatientProfile>> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .iter_mut()
            .find(|p| p.uid == uid && p.owner_id == owner_id && p.is_active)
            .map(|profile| {
                profile.apply_update(update);
                profile.updated_at = Utc::now();
                profile.clone()
            }))
    }

    async fn deactivate_patient_profile(&self, uid: &str, owner_id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .profiles
            .iter_mut()
            .find(|p| p.uid == uid && p.owner_id == owner_id && p.is_active)
        {
            Some(profile) => {
                profile.is_active = false;
                profile.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search_patient_profiles(
        &self,
        query: &str,
        limit: i64,
    ) -> RepoResult<Vec<PatientProfile>> {
        let query = query.trim();
        let needle = query.to_lowercase();
        let digits: String = query.chars().filter(|c| !c.is_whitespace()).collect();
        let tables = self.tables.lock().await;

        let mut matches: Vec<PatientProfile> = tables
            .profiles
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| {
                p.patient_name.to_lowercase().contains(&needle)
                    || p
                        .preferred_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
                    || p.uid.eq_ignore_ascii_case(query)
                    || p.nhs_number.as_deref() == Some(digits.as_str())
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.patient_name.cmp(&b.patient_name));
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }

    // --- Card requests ---

    async fn create_card_request(
        &self,
        profile_id: Uuid,
        requested_by: Uuid,
        delivery_address: &str,
        quantity: i32,
    ) -> RepoResult<CardRequest> {
        let mut tables = self.tables.lock().await;
        if tables
            .card_requests
            .iter()
            .any(|c| c.profile_id == profile_id && c.status.is_open())
        {
            return Err(AppError::conflict(
                "An open card request already exists for this profile.",
            ));
        }
        let now = Utc::now();
        let request = CardRequest {
            id: Uuid::new_v4(),
            profile_id,
            requested_by,
            delivery_address: delivery_address.to_string(),
            quantity,
            status: CardRequestStatus::Pending,
            admin_notes: None,
            created_at: now,
            updated_at: now,
            dispatched_at: None,
        };
        tables.card_requests.push(request.clone());
        Ok(request)
    }

    async fn get_card_request(&self, id: Uuid) -> RepoResult<Option<CardRequest>> {
        let tables = self.tables.lock().await;
        Ok(tables.card_requests.iter().find(|c| c.id == id).cloned())
    }

    async fn list_card_requests_for_user(&self, user_id: Uuid) -> RepoResult<Vec<CardRequest>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.card_requests, |c| c.requested_by == user_id))
    }

    async fn list_card_requests(
        &self,
        status: Option<CardRequestStatus>,
    ) -> RepoResult<Vec<CardRequest>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.card_requests, |c| {
            status.is_none_or(|s| c.status == s)
        }))
    }

    async fn update_card_request_status(
        &self,
        id: Uuid,
        from: CardRequestStatus,
        to: CardRequestStatus,
        admin_notes: Option<&str>,
    ) -> RepoResult<Option<CardRequest>> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .card_requests
            .iter_mut()
            .find(|c| c.id == id && c.status == from)
            .map(|card| {
                let now = Utc::now();
                card.status = to;
                if let Some(notes) = admin_notes.map(str::trim).filter(|n| !n.is_empty()) {
                    card.admin_notes = Some(notes.to_string());
                }
                if to == CardRequestStatus::Dispatched {
                    card.dispatched_at = Some(now);
                }
                card.updated_at = now;
                card.clone()
            }))
    }

    // --- Onboarding enquiries ---

    async fn create_enquiry(&self, req: &CreateEnquiryRequest) -> RepoResult<OnboardingEnquiry> {
        let mut tables = self.tables.lock().await;
        let enquiry = OnboardingEnquiry {
            id: Uuid::new_v4(),
            organisation_name: req.organisation_name.clone(),
            organisation_type: req.organisation_type,
            contact_name: req.contact_name.clone(),
            email: req.email.clone(),
            phone: req.phone.clone(),
            estimated_users: req.estimated_users,
            message: req.message.clone(),
            status: EnquiryStatus::New,
            created_at: Utc::now(),
        };
        tables.enquiries.push(enquiry.clone());
        Ok(enquiry)
    }

    async fn list_enquiries(
        &self,
        status: Option<EnquiryStatus>,
    ) -> RepoResult<Vec<OnboardingEnquiry>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.enquiries, |e| {
            status.is_none_or(|s| e.status == s)
        }))
    }

    async fn set_enquiry_status(
        &self,
        id: Uuid,
        status: EnquiryStatus,
    ) -> RepoResult<Option<OnboardingEnquiry>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.enquiries.iter_mut().find(|e| e.id == id).map(|e| {
            e.status = status;
            e.clone()
        }))
    }

    // --- Support ---

    async fn create_support_message(
        &self,
        req: &CreateSupportRequest,
        user_id: Option<Uuid>,
    ) -> RepoResult<SupportMessage> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let message = SupportMessage {
            id: Uuid::new_v4(),
            user_id,
            name: req.name.clone(),
            email: req.email.clone(),
            subject: req.subject.clone(),
            message: req.message.clone(),
            status: SupportStatus::Open,
            created_at: now,
            updated_at: now,
        };
        tables.support.push(message.clone());
        Ok(message)
    }

    async fn list_support_messages(
        &self,
        status: Option<SupportStatus>,
    ) -> RepoResult<Vec<SupportMessage>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.support, |m| {
            status.is_none_or(|s| m.status == s)
        }))
    }

    async fn set_support_status(
        &self,
        id: Uuid,
        status: SupportStatus,
    ) -> RepoResult<Option<SupportMessage>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.support.iter_mut().find(|m| m.id == id).map(|m| {
            m.status = status;
            m.updated_at = Utc::now();
            m.clone()
        }))
    }

    // --- Audit log ---

    async fn record_audit(&self, entry: NewAuditEntry) -> RepoResult<()> {
        let mut tables = self.tables.lock().await;
        let id = tables.audit.len() as i64 + 1;
        tables.audit.push(AuditEntry {
            id,
            user_id: entry.user_id,
            action: entry.action,
            target_type: entry.target_type,
            target_id: entry.target_id,
            ip_address: entry.ip_address,
            details: entry.details,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_audit_entries(&self, filter: &AuditFilter) -> RepoResult<Vec<AuditEntry>> {
        let tables = self.tables.lock().await;
        let mut entries = newest_first(&tables.audit, |e| {
            filter.user_id.is_none_or(|id| e.user_id == Some(id))
                && filter.action.is_none_or(|a| e.action == a)
        });
        entries.truncate(filter.limit.max(0) as usize);
        Ok(entries)
    }

    // --- Testimonials ---

    async fn list_testimonials(&self, approved_only: bool) -> RepoResult<Vec<Testimonial>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.testimonials, |t| {
            !approved_only || t.is_approved
        }))
    }

    async fn create_testimonial(&self, req: &CreateTestimonialRequest) -> RepoResult<Testimonial> {
        let mut tables = self.tables.lock().await;
        let testimonial = Testimonial {
            id: Uuid::new_v4(),
            author_name: req.author_name.clone(),
            author_role: req.author_role.clone(),
            quote: req.quote.clone(),
            is_approved: false,
            created_at: Utc::now(),
        };
        tables.testimonials.push(testimonial.clone());
        Ok(testimonial)
    }

    async fn set_testimonial_approved(
        &self,
        id: Uuid,
        is_approved: bool,
    ) -> RepoResult<Option<Testimonial>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.testimonials.iter_mut().find(|t| t.id == id).map(|t| {
            t.is_approved = is_approved;
            t.clone()
        }))
    }

    async fn delete_testimonial(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.testimonials.len();
        tables.testimonials.retain(|t| t.id != id);
        Ok(tables.testimonials.len() < before)
    }

    // --- Health & stats ---

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let tables = self.tables.lock().await;
        let count_role =
            |role: UserRole| tables.users.iter().filter(|u| u.role == role).count() as i64;
        Ok(AdminDashboardStats {
            total_users: tables.users.len() as i64,
            nhs_users: count_role(UserRole::NhsUser),
            patients: count_role(UserRole::Patient),
            family_members: count_role(UserRole::Family),
            admins: count_role(UserRole::Admin),
            active_profiles: tables.profiles.iter().filter(|p| p.is_active).count() as i64,
            pending_card_requests: tables
                .card_requests
                .iter()
                .filter(|c| c.status == CardRequestStatus::Pending)
                .count() as i64,
            open_support_messages: tables
                .support
                .iter()
                .filter(|m| m.status != SupportStatus::Resolved)
                .count() as i64,
            new_enquiries: tables
                .enquiries
                .iter()
                .filter(|e| e.status == EnquiryStatus::New)
                .count() as i64,
        })
    }

    async fn ping(&self) -> RepoResult<()> {
        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Unavailable);
        }
        Ok(())
    }
}
