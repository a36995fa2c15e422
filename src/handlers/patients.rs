use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;

use super::{trimmed, trimmed_opt};
use crate::{
    AppState, audit,
    auth::AuthUser,
    error::AppError,
    extract::{AppJson, AppPath, AppQuery, ClientIp},
    models::{
        AuditAction, NewAuditEntry, PatientProfile, PatientProfileInput, PatientSearchQuery,
        UpdatePatientProfileRequest, UserRole,
    },
    repository::SEARCH_LIMIT,
    validation::{MAX_NAME_LEN, MAX_TEXT_LEN, Validator, normalise_nhs_number},
};

const MIN_SEARCH_LEN: usize = 2;

/// The free-text fields of a profile, in the order they are validated.
fn long_text_fields<'a>(
    communication_needs: Option<&'a str>,
    mobility_needs: Option<&'a str>,
    dietary_needs: Option<&'a str>,
    allergies: Option<&'a str>,
    likes: Option<&'a str>,
    dislikes: Option<&'a str>,
    additional_notes: Option<&'a str>,
) -> [(&'static str, Option<&'a str>); 7] {
    [
        ("communication_needs", communication_needs),
        ("mobility_needs", mobility_needs),
        ("dietary_needs", dietary_needs),
        ("allergies", allergies),
        ("likes", likes),
        ("dislikes", dislikes),
        ("additional_notes", additional_notes),
    ]
}

fn validate_new_profile(input: &PatientProfileInput) -> Result<(), AppError> {
    let today = Utc::now().date_naive();
    let mut v = Validator::new();
    v.required("patient_name", &input.patient_name)
        .max_len("patient_name", &input.patient_name, MAX_NAME_LEN)
        .max_len_opt("preferred_name", input.preferred_name.as_deref(), MAX_NAME_LEN)
        .date_of_birth("date_of_birth", input.date_of_birth, today)
        .nhs_number("nhs_number", input.nhs_number.as_deref())
        .max_len_opt("next_of_kin_name", input.next_of_kin_name.as_deref(), MAX_NAME_LEN)
        .phone("next_of_kin_phone", input.next_of_kin_phone.as_deref());

    for (field, value) in long_text_fields(
        input.communication_needs.as_deref(),
        input.mobility_needs.as_deref(),
        input.dietary_needs.as_deref(),
        input.allergies.as_deref(),
        input.likes.as_deref(),
        input.dislikes.as_deref(),
        input.additional_notes.as_deref(),
    ) {
        v.max_len_opt(field, value, MAX_TEXT_LEN);
    }
    v.finish()
}

fn validate_update(update: &UpdatePatientProfileRequest) -> Result<(), AppError> {
    let today = Utc::now().date_naive();
    let mut v = Validator::new();
    if let Some(name) = update.patient_name.as_deref() {
        v.required("patient_name", name)
            .max_len("patient_name", name, MAX_NAME_LEN);
    }
    if let Some(dob) = update.date_of_birth {
        v.date_of_birth("date_of_birth", dob, today);
    }
    v.max_len_opt("preferred_name", update.preferred_name.as_deref(), MAX_NAME_LEN)
        .nhs_number("nhs_number", update.nhs_number.as_deref())
        .max_len_opt("next_of_kin_name", update.next_of_kin_name.as_deref(), MAX_NAME_LEN)
        .phone("next_of_kin_phone", update.next_of_kin_phone.as_deref());

    for (field, value) in long_text_fields(
        update.communication_needs.as_deref(),
        update.mobility_needs.as_deref(),
        update.dietary_needs.as_deref(),
        update.allergies.as_deref(),
        update.likes.as_deref(),
        update.dislikes.as_deref(),
        update.additional_notes.as_deref(),
    ) {
        v.max_len_opt(field, value, MAX_TEXT_LEN);
    }
    v.finish()
}

/// Trims every field and stores NHS numbers as bare digits.
fn normalise_input(input: PatientProfileInput) -> PatientProfileInput {
    PatientProfileInput {
        patient_name: trimmed(&input.patient_name),
        preferred_name: trimmed_opt(input.preferred_name.as_deref()),
        date_of_birth: input.date_of_birth,
        nhs_number: input.nhs_number.as_deref().and_then(normalise_nhs_number),
        communication_needs: trimmed_opt(input.communication_needs.as_deref()),
        mobility_needs: trimmed_opt(input.mobility_needs.as_deref()),
        dietary_needs: trimmed_opt(input.dietary_needs.as_deref()),
        allergies: trimmed_opt(input.allergies.as_deref()),
        likes: trimmed_opt(input.likes.as_deref()),
        dislikes: trimmed_opt(input.dislikes.as_deref()),
        next_of_kin_name: trimmed_opt(input.next_of_kin_name.as_deref()),
        next_of_kin_phone: trimmed_opt(input.next_of_kin_phone.as_deref()),
        additional_notes: trimmed_opt(input.additional_notes.as_deref()),
    }
}

/// create_profile
///
/// [Authenticated Route] A patient or family member creates the profile they manage.
/// Only one active profile per account; the database index backs this up.
#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientProfileInput,
    responses(
        (status = 201, description = "Profile created", body = PatientProfile),
        (status = 403, description = "Role cannot own a profile"),
        (status = 409, description = "An active profile already exists"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<PatientProfileInput>,
) -> Result<(StatusCode, Json<PatientProfile>), AppError> {
    auth_user.require_profile_owner()?;
    validate_new_profile(&payload)?;

    let profile = state
        .repo
        .create_patient_profile(auth_user.id, &normalise_input(payload))
        .await?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::ProfileCreated)
            .by(auth_user.id)
            .target("patient_profile", &profile.uid)
            .ip(&ip),
    )
    .await;
    state.cache.invalidate_stats();

    Ok((StatusCode::CREATED, Json(profile)))
}

/// get_my_profile
///
/// [Authenticated Route] The caller's active profile.
#[utoipa::path(
    get,
    path = "/patients/mine",
    responses(
        (status = 200, description = "Active profile", body = PatientProfile),
        (status = 404, description = "No active profile")
    )
)]
pub async fn get_my_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PatientProfile>, AppError> {
    state
        .repo
        .get_active_profile_for_owner(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("patient profile"))
}

/// update_profile
///
/// [Authenticated Route] Owner-only partial update. Absent fields are kept, empty
/// strings clear optional fields. Anyone but the owner gets a 404.
#[utoipa::path(
    put,
    path = "/patients/{uid}",
    params(("uid" = String, Path, description = "Public profile UID")),
    request_body = UpdatePatientProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = PatientProfile),
        (status = 404, description = "No such active profile owned by the caller"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(uid): AppPath<String>,
    AppJson(mut payload): AppJson<UpdatePatientProfileRequest>,
) -> Result<Json<PatientProfile>, AppError> {
    validate_update(&payload)?;
    if let Some(nhs) = payload.nhs_number.as_deref() {
        // Blank clears; anything else passed validation and is stored as digits.
        payload.nhs_number = Some(normalise_nhs_number(nhs).unwrap_or_default());
    }

    let uid = uid.trim().to_uppercase();
    let profile = state
        .repo
        .update_patient_profile(&uid, id, &payload)
        .await?
        .ok_or(AppError::NotFound("patient profile"))?;

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::ProfileUpdated)
            .by(id)
            .target("patient_profile", &profile.uid)
            .ip(&ip),
    )
    .await;

    Ok(Json(profile))
}

/// deactivate_profile
///
/// [Authenticated Route] Owner-only soft delete. The row is kept for the audit trail
/// and the owner may create a new profile afterwards.
#[utoipa::path(
    delete,
    path = "/patients/{uid}",
    params(("uid" = String, Path, description = "Public profile UID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 404, description = "No such active profile owned by the caller")
    )
)]
pub async fn deactivate_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(uid): AppPath<String>,
) -> Result<StatusCode, AppError> {
    let uid = uid.trim().to_uppercase();
    if !state.repo.deactivate_patient_profile(&uid, id).await? {
        return Err(AppError::NotFound("patient profile"));
    }

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::ProfileDeactivated)
            .by(id)
            .target("patient_profile", &uid)
            .ip(&ip),
    )
    .await;
    state.cache.invalidate_stats();

    Ok(StatusCode::NO_CONTENT)
}

/// search_profiles
///
/// [Authenticated Route] Clinical lookup by name fragment, card UID or NHS number.
#[utoipa::path(
    get,
    path = "/patients/search",
    params(PatientSearchQuery),
    responses(
        (status = 200, description = "Matching active profiles (max 25)", body = [PatientProfile]),
        (status = 403, description = "Not NHS staff or admin"),
        (status = 422, description = "Query too short")
    )
)]
pub async fn search_profiles(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PatientSearchQuery>,
) -> Result<Json<Vec<PatientProfile>>, AppError> {
    auth_user.require_role(&[UserRole::NhsUser, UserRole::Admin])?;

    let q = params.q.trim();
    if q.chars().count() < MIN_SEARCH_LEN {
        let mut v = Validator::new();
        v.fail("q", "Enter at least 2 characters to search.");
        v.finish()?;
    }

    let results = state.repo.search_patient_profiles(q, SEARCH_LIMIT).await?;
    tracing::debug!(user_id = %auth_user.id, matches = results.len(), "patient search");
    Ok(Json(results))
}

/// view_profile
///
/// [Authenticated Route] The profile behind a card UID. NHS staff and admins may view
/// any active profile, owners their own; everyone else gets a 403. Every successful
/// view is written to the audit log.
#[utoipa::path(
    get,
    path = "/patient/profile/{uid}",
    params(("uid" = String, Path, description = "Public profile UID")),
    responses(
        (status = 200, description = "Patient profile", body = PatientProfile),
        (status = 403, description = "Not permitted to view this profile"),
        (status = 404, description = "Unknown or deactivated profile")
    )
)]
pub async fn view_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppPath(uid): AppPath<String>,
) -> Result<Json<PatientProfile>, AppError> {
    let uid = uid.trim().to_uppercase();
    let clinical = auth_user.role.is_clinical();

    // Admins may still open deactivated profiles; nobody else sees them.
    let profile = state
        .repo
        .get_patient_profile_by_uid(&uid)
        .await?
        .filter(|p| p.is_active || auth_user.is_admin());

    let profile = match profile {
        Some(p) if clinical || p.owner_id == auth_user.id => p,
        None if clinical => return Err(AppError::NotFound("patient profile")),
        _ => {
            tracing::warn!(user_id = %auth_user.id, %uid, "profile view refused");
            return Err(AppError::forbidden(
                "You do not have permission to view this profile.",
            ));
        }
    };

    audit::record(
        &state.repo,
        NewAuditEntry::new(AuditAction::ProfileViewed)
            .by(auth_user.id)
            .target("patient_profile", &profile.uid)
            .ip(&ip)
            .details(format!("viewed as {}", auth_user.role)),
    )
    .await;

    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input() -> PatientProfileInput {
        PatientProfileInput {
            patient_name: "  Margaret Jones ".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1941, 3, 9).unwrap(),
            nhs_number: Some("943 476 5919".into()),
            allergies: Some("   ".into()),
            ..Default::default()
        }
    }

    #[test]
    fn normalise_trims_and_strips_nhs_spaces() {
        let clean = normalise_input(input());
        assert_eq!(clean.patient_name, "Margaret Jones");
        assert_eq!(clean.nhs_number.as_deref(), Some("9434765919"));
        assert_eq!(clean.allergies, None);
    }

    #[test]
    fn new_profile_rejects_bad_nhs_number_and_long_notes() {
        let mut bad = input();
        bad.nhs_number = Some("9434765918".into());
        bad.additional_notes = Some("x".repeat(MAX_TEXT_LEN + 1));

        let Err(AppError::Validation(fields)) = validate_new_profile(&bad) else {
            panic!("expected validation error");
        };
        assert!(fields.contains_key("nhs_number"));
        assert!(fields.contains_key("additional_notes"));
    }

    #[test]
    fn update_allows_clearing_but_not_blank_name() {
        let clear = UpdatePatientProfileRequest {
            nhs_number: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_update(&clear).is_ok());

        let blank_name = UpdatePatientProfileRequest {
            patient_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(validate_update(&blank_name).is_err());
    }
}
