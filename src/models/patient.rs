use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// PatientProfile
///
/// The "Know My Patient" passport: what clinical staff need to know about a person
/// beyond their medical record. `uid` is the short public identifier printed on the
/// patient's card and used by NHS staff to look the profile up.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PatientProfile {
    pub id: Uuid,
    pub uid: String,
    // The patient or family member who manages this profile.
    pub owner_id: Uuid,
    pub patient_name: String,
    pub preferred_name: Option<String>,
    #[ts(type = "string")]
    pub date_of_birth: NaiveDate,
    // Ten digits, no spaces.
    pub nhs_number: Option<String>,
    pub communication_needs: Option<String>,
    pub mobility_needs: Option<String>,
    pub dietary_needs: Option<String>,
    pub allergies: Option<String>,
    pub likes: Option<String>,
    pub dislikes: Option<String>,
    pub next_of_kin_name: Option<String>,
    pub next_of_kin_phone: Option<String>,
    pub additional_notes: Option<String>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PatientProfileInput
///
/// Payload for `POST /patients`. Only the name and date of birth are mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PatientProfileInput {
    pub patient_name: String,
    #[serde(default)]
    pub preferred_name: Option<String>,
    #[ts(type = "string")]
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub nhs_number: Option<String>,
    #[serde(default)]
    pub communication_needs: Option<String>,
    #[serde(default)]
    pub mobility_needs: Option<String>,
    #[serde(default)]
    pub dietary_needs: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub likes: Option<String>,
    #[serde(default)]
    pub dislikes: Option<String>,
    #[serde(default)]
    pub next_of_kin_name: Option<String>,
    #[serde(default)]
    pub next_of_kin_phone: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

/// UpdatePatientProfileRequest
///
/// Partial update for `PUT /patients/{uid}`. An absent field is left untouched; an
/// empty string clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdatePatientProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nhs_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_needs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobility_needs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dietary_needs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dislikes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_of_kin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_of_kin_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

/// Query parameters for `GET /patients/search`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PatientSearchQuery {
    /// Name fragment, profile UID or NHS number. At least two characters.
    pub q: String,
}

/// Applies a partial-update field: absent keeps, empty clears, anything else replaces.
pub(crate) fn merge_optional(current: &mut Option<String>, update: &Option<String>) {
    if let Some(value) = update {
        let trimmed = value.trim();
        *current = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }
}

impl PatientProfile {
    /// Applies an update in memory with the same semantics as the SQL update.
    pub(crate) fn apply_update(&mut self, req: &UpdatePatientProfileRequest) {
        if let Some(name) = req.patient_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            self.patient_name = name.to_string();
        }
        if let Some(dob) = req.date_of_birth {
            self.date_of_birth = dob;
        }
        merge_optional(&mut self.preferred_name, &req.preferred_name);
        merge_optional(&mut self.nhs_number, &req.nhs_number);
        merge_optional(&mut self.communication_needs, &req.communication_needs);
        merge_optional(&mut self.mobility_needs, &req.mobility_needs);
        merge_optional(&mut self.dietary_needs, &req.dietary_needs);
        merge_optional(&mut self.allergies, &req.allergies);
        merge_optional(&mut self.likes, &req.likes);
        merge_optional(&mut self.dislikes, &req.dislikes);
        merge_optional(&mut self.next_of_kin_name, &req.next_of_kin_name);
        merge_optional(&mut self.next_of_kin_phone, &req.next_of_kin_phone);
        merge_optional(&mut self.additional_notes, &req.additional_notes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_optional_keeps_clears_and_replaces() {
        let mut field = Some("peanuts".to_string());

        merge_optional(&mut field, &None);
        assert_eq!(field.as_deref(), Some("peanuts"));

        merge_optional(&mut field, &Some("  shellfish ".to_string()));
        assert_eq!(field.as_deref(), Some("shellfish"));

        merge_optional(&mut field, &Some("   ".to_string()));
        assert_eq!(field, None);
    }
}
