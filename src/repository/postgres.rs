use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, RepoResult, is_unique_violation},
    models::{
        AdminDashboardStats, AuditEntry, AuditFilter, CardRequest, CardRequestStatus,
        CreateEnquiryRequest, CreateSupportRequest, CreateTestimonialRequest, EnquiryStatus,
        NewAuditEntry, NewUser, OnboardingEnquiry, PatientProfile, PatientProfileInput,
        SupportMessage, SupportStatus, Testimonial, UpdatePatientProfileRequest, User, UserRole,
    },
    security::tokens::generate_profile_uid,
};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_active, email_verified_at, \
     verification_token_hash, last_login_at, created_at, updated_at";

const PROFILE_COLUMNS: &str = "id, uid, owner_id, patient_name, preferred_name, date_of_birth, \
     nhs_number, communication_needs, mobility_needs, dietary_needs, allergies, likes, dislikes, \
     next_of_kin_name, next_of_kin_phone, additional_notes, is_active, created_at, updated_at";

const CARD_COLUMNS: &str = "id, profile_id, requested_by, delivery_address, quantity, status, \
     admin_notes, created_at, updated_at, dispatched_at";

const ENQUIRY_COLUMNS: &str = "id, organisation_name, organisation_type, contact_name, email, \
     phone, estimated_users, message, status, created_at";

const SUPPORT_COLUMNS: &str =
    "id, user_id, name, email, subject, message, status, created_at, updated_at";

const AUDIT_COLUMNS: &str =
    "id, user_id, action, target_type, target_id, ip_address, details, created_at";

const TESTIMONIAL_COLUMNS: &str = "id, author_name, author_role, quote, is_approved, created_at";

const PROFILE_UID_CONSTRAINT: &str = "patient_profiles_uid_key";
// Retries on the (unlikely) event of a 48-bit uid collision.
const UID_ATTEMPTS: usize = 3;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are checked at runtime so the crate builds
/// without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::conflict(message)
    } else {
        AppError::Database(err)
    }
}

fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.constraint())
        .map(str::to_string)
}

/// `%fragment%` for ILIKE with the wildcard characters escaped.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, role, verification_token_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.verification_token_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "An account with this email already exists."))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, role: Option<UserRole>) -> RepoResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::text IS NULL OR role = $1) ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn verify_email(&self, token_hash: &str) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET email_verified_at = now(), verification_token_hash = NULL, \
             updated_at = now() WHERE verification_token_hash = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn record_login(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_user_role(&self, id: Uuid, role: UserRole) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- Password resets ---

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO password_resets (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        // The row lock taken by this UPDATE serialises concurrent uses of one token.
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE password_resets SET used_at = $2 \
             WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2 \
             RETURNING user_id",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE password_resets SET used_at = $2 WHERE user_id = $1 AND used_at IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user_id))
    }

    // --- Patient profiles ---

    async fn create_patient_profile(
        &self,
        owner_id: Uuid,
        input: &PatientProfileInput,
    ) -> RepoResult<PatientProfile> {
        let sql = format!(
            "INSERT INTO patient_profiles (uid, owner_id, patient_name, preferred_name, \
             date_of_birth, nhs_number, communication_needs, mobility_needs, dietary_needs, \
             allergies, likes, dislikes, next_of_kin_name, next_of_kin_phone, additional_notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {PROFILE_COLUMNS}"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = sqlx::query_as::<_, PatientProfile>(&sql)
                .bind(generate_profile_uid())
                .bind(owner_id)
                .bind(&input.patient_name)
                .bind(&input.preferred_name)
                .bind(input.date_of_birth)
                .bind(&input.nhs_number)
                .bind(&input.communication_needs)
                .bind(&input.mobility_needs)
                .bind(&input.dietary_needs)
                .bind(&input.allergies)
                .bind(&input.likes)
                .bind(&input.dislikes)
                .bind(&input.next_of_kin_name)
                .bind(&input.next_of_kin_phone)
                .bind(&input.additional_notes)
                .fetch_one(&self.pool)
                .await;

            match result {
                Ok(profile) => return Ok(profile),
                Err(e)
                    if attempt < UID_ATTEMPTS
                        && violated_constraint(&e).as_deref() == Some(PROFILE_UID_CONSTRAINT) =>
                {
                    tracing::warn!(attempt, "patient uid collision, retrying");
                }
                Err(e) => {
                    return Err(conflict_on_unique(
                        e,
                        "An active patient profile already exists for this account.",
                    ));
                }
            }
        }
    }

    async fn get_patient_profile_by_uid(&self, uid: &str) -> RepoResult<Option<PatientProfile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM patient_profiles WHERE uid = $1");
        Ok(sqlx::query_as::<_, PatientProfile>(&sql)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_active_profile_for_owner(
        &self,
        owner_id: Uuid,
    ) -> RepoResult<Option<PatientProfile>> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM patient_profiles WHERE owner_id = $1 AND is_active"
        );
        Ok(sqlx::query_as::<_, PatientProfile>(&sql)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Required columns use COALESCE; optional ones distinguish "not sent" (NULL
    /// parameter, keep) from "sent empty" (clear).
    async fn update_patient_profile(
        &self,
        uid: &str,
        owner_id: Uuid,
        update: &UpdatePatientProfileRequest,
    ) -> RepoResult<Option<PatientProfile>> {
        let sql = format!(
            "UPDATE patient_profiles SET \
             patient_name = COALESCE(NULLIF(btrim($3::text), ''), patient_name), \
             date_of_birth = COALESCE($4::date, date_of_birth), \
             preferred_name = CASE WHEN $5::text IS NULL THEN preferred_name ELSE NULLIF(btrim($5::text), '') END, \
             nhs_number = CASE WHEN $6::text IS NULL THEN nhs_number ELSE NULLIF(btrim($6::text), '') END, \
             communication_needs = CASE WHEN $7::text IS NULL THEN communication_needs ELSE NULLIF(btrim($7::text), '') END, \
             mobility_needs = CASE WHEN $8::text IS NULL THEN mobility_needs ELSE NULLIF(btrim($8::text), '') END, \
             dietary_needs = CASE WHEN $9::text IS NULL THEN dietary_needs ELSE NULLIF(btrim($9::text), '') END, \
             allergies = CASE WHEN $10::text IS NULL THEN allergies ELSE NULLIF(btrim($10::text), '') END, \
             likes = CASE WHEN $11::text IS NULL THEN likes ELSE NULLIF(btrim($11::text), '') END, \
             dislikes = CASE WHEN $12::text IS NULL THEN dislikes ELSE NULLIF(btrim($12::text), '') END, \
             next_of_kin_name = CASE WHEN $13::text IS NULL THEN next_of_kin_name ELSE NULLIF(btrim($13::text), '') END, \
             next_of_kin_phone = CASE WHEN $14::text IS NULL THEN next_of_kin_phone ELSE NULLIF(btrim($14::text), '') END, \
             additional_notes = CASE WHEN $15::text IS NULL THEN additional_notes ELSE NULLIF(btrim($15::text), '') END, \
             updated_at = now() \
             WHERE uid = $1 AND owner_id = $2 AND is_active \
             RETURNING {PROFILE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, PatientProfile>(&sql)
            .bind(uid)
            .bind(owner_id)
            .bind(&update.patient_name)
            .bind(update.date_of_birth)
            .bind(&update.preferred_name)
            .bind(&update.nhs_number)
            .bind(&update.communication_needs)
            .bind(&update.mobility_needs)
            .bind(&update.dietary_needs)
            .bind(&update.allergies)
            .bind(&update.likes)
            .bind(&update.dislikes)
            .bind(&update.next_of_kin_name)
            .bind(&update.next_of_kin_phone)
            .bind(&update.additional_notes)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn deactivate_patient_profile(&self, uid: &str, owner_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE patient_profiles SET is_active = FALSE, updated_at = now() \
             WHERE uid = $1 AND owner_id = $2 AND is_active",
        )
        .bind(uid)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_patient_profiles(
        &self,
        query: &str,
        limit: i64,
    ) -> RepoResult<Vec<PatientProfile>> {
        let query = query.trim();
        let digits: String = query.chars().filter(|c| !c.is_whitespace()).collect();
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM patient_profiles \
             WHERE is_active AND ( \
                 patient_name ILIKE $1 ESCAPE '\\' \
                 OR preferred_name ILIKE $1 ESCAPE '\\' \
                 OR uid = upper($2) \
                 OR nhs_number = $3 \
             ) ORDER BY patient_name LIMIT $4"
        );
        Ok(sqlx::query_as::<_, PatientProfile>(&sql)
            .bind(like_pattern(query))
            .bind(query)
            .bind(digits)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    // --- Card requests ---

    async fn create_card_request(
        &self,
        profile_id: Uuid,
        requested_by: Uuid,
        delivery_address: &str,
        quantity: i32,
    ) -> RepoResult<CardRequest> {
        let sql = format!(
            "INSERT INTO card_requests (profile_id, requested_by, delivery_address, quantity) \
             VALUES ($1, $2, $3, $4) RETURNING {CARD_COLUMNS}"
        );
        sqlx::query_as::<_, CardRequest>(&sql)
            .bind(profile_id)
            .bind(requested_by)
            .bind(delivery_address)
            .bind(quantity)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "An open card request already exists for this profile."))
    }

    async fn get_card_request(&self, id: Uuid) -> RepoResult<Option<CardRequest>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM card_requests WHERE id = $1");
        Ok(sqlx::query_as::<_, CardRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_card_requests_for_user(&self, user_id: Uuid) -> RepoResult<Vec<CardRequest>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM card_requests WHERE requested_by = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, CardRequest>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_card_requests(
        &self,
        status: Option<CardRequestStatus>,
    ) -> RepoResult<Vec<CardRequest>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM card_requests \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, CardRequest>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_card_request_status(
        &self,
        id: Uuid,
        from: CardRequestStatus,
        to: CardRequestStatus,
        admin_notes: Option<&str>,
    ) -> RepoResult<Option<CardRequest>> {
        let sql = format!(
            "UPDATE card_requests SET status = $3, \
             admin_notes = COALESCE(NULLIF(btrim($4::text), ''), admin_notes), \
             updated_at = now(), \
             dispatched_at = CASE WHEN $3 = 'dispatched' THEN now() ELSE dispatched_at END \
             WHERE id = $1 AND status = $2 RETURNING {CARD_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, CardRequest>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(admin_notes)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- Onboarding enquiries ---

    async fn create_enquiry(&self, req: &CreateEnquiryRequest) -> RepoResult<OnboardingEnquiry> {
        let sql = format!(
            "INSERT INTO onboarding_enquiries (organisation_name, organisation_type, contact_name, \
             email, phone, estimated_users, message) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {ENQUIRY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, OnboardingEnquiry>(&sql)
            .bind(&req.organisation_name)
            .bind(req.organisation_type.as_str())
            .bind(&req.contact_name)
            .bind(&req.email)
            .bind(&req.phone)
            .bind(req.estimated_users)
            .bind(&req.message)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_enquiries(
        &self,
        status: Option<EnquiryStatus>,
    ) -> RepoResult<Vec<OnboardingEnquiry>> {
        let sql = format!(
            "SELECT {ENQUIRY_COLUMNS} FROM onboarding_enquiries \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, OnboardingEnquiry>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_enquiry_status(
        &self,
        id: Uuid,
        status: EnquiryStatus,
    ) -> RepoResult<Option<OnboardingEnquiry>> {
        let sql = format!(
            "UPDATE onboarding_enquiries SET status = $2 WHERE id = $1 RETURNING {ENQUIRY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, OnboardingEnquiry>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- Support ---

    async fn create_support_message(
        &self,
        req: &CreateSupportRequest,
        user_id: Option<Uuid>,
    ) -> RepoResult<SupportMessage> {
        let sql = format!(
            "INSERT INTO support_messages (user_id, name, email, subject, message) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SUPPORT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SupportMessage>(&sql)
            .bind(user_id)
            .bind(&req.name)
            .bind(&req.email)
            .bind(&req.subject)
            .bind(&req.message)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_support_messages(
        &self,
        status: Option<SupportStatus>,
    ) -> RepoResult<Vec<SupportMessage>> {
        let sql = format!(
            "SELECT {SUPPORT_COLUMNS} FROM support_messages \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, SupportMessage>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_support_status(
        &self,
        id: Uuid,
        status: SupportStatus,
    ) -> RepoResult<Option<SupportMessage>> {
        let sql = format!(
            "UPDATE support_messages SET status = $2, updated_at = now() \
             WHERE id = $1 RETURNING {SUPPORT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SupportMessage>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- Audit log ---

    async fn record_audit(&self, entry: NewAuditEntry) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (user_id, action, target_type, target_id, ip_address, details) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.target_type)
        .bind(entry.target_id)
        .bind(entry.ip_address)
        .bind(entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Filters are appended with QueryBuilder so every value stays a bound parameter.
    async fn list_audit_entries(&self, filter: &AuditFilter) -> RepoResult<Vec<AuditEntry>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE TRUE"));

        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ");
            builder.push_bind(user_id);
        }
        if let Some(action) = filter.action {
            builder.push(" AND action = ");
            builder.push_bind(action.as_str());
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(filter.limit);

        Ok(builder
            .build_query_as::<AuditEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    // --- Testimonials ---

    async fn list_testimonials(&self, approved_only: bool) -> RepoResult<Vec<Testimonial>> {
        let sql = format!(
            "SELECT {TESTIMONIAL_COLUMNS} FROM testimonials \
             WHERE (NOT $1 OR is_approved) ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Testimonial>(&sql)
            .bind(approved_only)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_testimonial(&self, req: &CreateTestimonialRequest) -> RepoResult<Testimonial> {
        let sql = format!(
            "INSERT INTO testimonials (author_name, author_role, quote) VALUES ($1, $2, $3) \
             RETURNING {TESTIMONIAL_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Testimonial>(&sql)
            .bind(&req.author_name)
            .bind(&req.author_role)
            .bind(&req.quote)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_testimonial_approved(
        &self,
        id: Uuid,
        is_approved: bool,
    ) -> RepoResult<Option<Testimonial>> {
        let sql = format!(
            "UPDATE testimonials SET is_approved = $2 WHERE id = $1 RETURNING {TESTIMONIAL_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Testimonial>(&sql)
            .bind(id)
            .bind(is_approved)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_testimonial(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM testimonials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Health & stats ---

    /// One round trip: every counter is a scalar subquery.
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        Ok(sqlx::query_as::<_, AdminDashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM users WHERE role = 'nhs_user') AS nhs_users,
                (SELECT COUNT(*) FROM users WHERE role = 'patient') AS patients,
                (SELECT COUNT(*) FROM users WHERE role = 'family') AS family_members,
                (SELECT COUNT(*) FROM users WHERE role = 'admin') AS admins,
                (SELECT COUNT(*) FROM patient_profiles WHERE is_active) AS active_profiles,
                (SELECT COUNT(*) FROM card_requests WHERE status = 'pending') AS pending_card_requests,
                (SELECT COUNT(*) FROM support_messages WHERE status <> 'resolved') AS open_support_messages,
                (SELECT COUNT(*) FROM onboarding_enquiries WHERE status = 'new') AS new_enquiries
            "#,
        )
        .fetch_one(&self.pool)
        .await?)
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("smith"), "%smith%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
