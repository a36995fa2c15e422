use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

text_enum! {
    /// CardRequestStatus
    ///
    /// Fulfilment stages of a printed Know My Patient card.
    CardRequestStatus {
        Pending => "pending",
        Approved => "approved",
        Printed => "printed",
        Dispatched => "dispatched",
        Rejected => "rejected",
    }
}

impl CardRequestStatus {
    /// Open requests block a new request for the same profile.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            CardRequestStatus::Pending | CardRequestStatus::Approved | CardRequestStatus::Printed
        )
    }

    /// pending -> approved | rejected, approved -> printed | rejected, printed -> dispatched.
    pub fn can_transition_to(&self, next: CardRequestStatus) -> bool {
        use CardRequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Printed)
                | (Approved, Rejected)
                | (Printed, Dispatched)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct CardRequest {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub requested_by: Uuid,
    pub delivery_address: String,
    pub quantity: i32,
    #[sqlx(try_from = "String")]
    pub status: CardRequestStatus,
    pub admin_notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub dispatched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateCardRequest {
    pub delivery_address: String,
    /// Number of cards, 1 to 5. Defaults to 1.
    #[serde(default)]
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateCardStatusRequest {
    pub status: CardRequestStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CardRequestFilter {
    pub status: Option<CardRequestStatus>,
}

#[cfg(test)]
mod tests {
    use super::CardRequestStatus::{self, *};

    #[test]
    fn fulfilment_moves_forward_only() {
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Printed));
        assert!(Printed.can_transition_to(Dispatched));

        assert!(!Pending.can_transition_to(Printed));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Printed.can_transition_to(Rejected));
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for next in CardRequestStatus::ALL {
            assert!(!Dispatched.can_transition_to(*next));
            assert!(!Rejected.can_transition_to(*next));
        }
    }

    #[test]
    fn open_states_are_the_non_terminal_ones() {
        let open: Vec<_> = CardRequestStatus::ALL
            .iter()
            .filter(|s| s.is_open())
            .collect();
        assert_eq!(open, vec![&Pending, &Approved, &Printed]);
    }

    #[test]
    fn text_round_trip_matches_database_values() {
        assert_eq!("dispatched".parse::<CardRequestStatus>(), Ok(Dispatched));
        assert_eq!(Rejected.as_str(), "rejected");
        assert!("lost".parse::<CardRequestStatus>().is_err());
    }
}
