//! HTTP handlers, grouped by audience.
//!
//! Every handler returns `Result<_, AppError>`; the error type renders the JSON error
//! body. Handlers validate, call the repository, record an audit entry where the action
//! matters, and answer with JSON. Email is sent inline through `mail::deliver`, which
//! never fails the request.

pub mod admin;
pub mod auth;
pub mod cards;
pub mod dashboard;
pub mod forms;
pub mod password;
pub mod patients;
pub mod site;

/// Trims a required text field.
pub(crate) fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

/// Trims an optional text field; blank becomes `None`.
pub(crate) fn trimmed_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimming_helpers() {
        assert_eq!(trimmed("  Ann "), "Ann");
        assert_eq!(trimmed_opt(Some("  ")), None);
        assert_eq!(trimmed_opt(Some(" x ")).as_deref(), Some("x"));
        assert_eq!(trimmed_opt(None), None);
    }
}
