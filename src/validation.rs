//! Form validation.
//!
//! Handlers build a `Validator`, run every rule for the payload and call `finish()`.
//! All failing fields are reported together as a 422 with a `fields` map, keeping the
//! first message per field.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::AppError;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 150;
pub const MAX_TEXT_LEN: usize = 5000;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Collects field errors for one request payload.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<&'static str, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error unless the field already has one.
    pub fn fail(&mut self, field: &'static str, message: impl Into<String>) -> &mut Self {
        self.errors.entry(field).or_insert_with(|| message.into());
        self
    }

    pub fn required(&mut self, field: &'static str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, "This field is required.");
        }
        self
    }

    pub fn max_len(&mut self, field: &'static str, value: &str, max: usize) -> &mut Self {
        if value.trim().chars().count() > max {
            self.fail(field, format!("Must be at most {max} characters."));
        }
        self
    }

    /// `max_len` for optional fields; `None` always passes.
    pub fn max_len_opt(&mut self, field: &'static str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(value) = value {
            self.max_len(field, value, max);
        }
        self
    }

    pub fn email(&mut self, field: &'static str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, "This field is required.");
        } else if !is_valid_email(value.trim()) {
            self.fail(field, "Enter a valid email address.");
        }
        self
    }

    pub fn password(&mut self, field: &'static str, value: &str) -> &mut Self {
        if let Some(problem) = password_problem(value) {
            self.fail(field, problem);
        }
        self
    }

    /// Blank counts as absent for optional NHS numbers.
    pub fn nhs_number(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            if !is_valid_nhs_number(value) {
                self.fail(field, "Enter a valid 10-digit NHS number.");
            }
        }
        self
    }

    pub fn phone(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            if !is_valid_phone(value) {
                self.fail(field, "Enter a valid UK phone number.");
            }
        }
        self
    }

    pub fn date_of_birth(&mut self, field: &'static str, value: NaiveDate, today: NaiveDate) -> &mut Self {
        if value > today {
            self.fail(field, "Date of birth cannot be in the future.");
        } else if value < earliest_date_of_birth() {
            self.fail(field, "Date of birth must be after 1900.");
        }
        self
    }

    pub fn range(&mut self, field: &'static str, value: i64, min: i64, max: i64) -> &mut Self {
        if value < min || value > max {
            self.fail(field, format!("Must be between {min} and {max}."));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

fn earliest_date_of_birth() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Structural email check: one `@`, a non-empty local part and a dotted domain whose
/// labels are all non-empty. No whitespace anywhere.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

pub fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns the reason a password is unacceptable, or `None`.
pub fn password_problem(password: &str) -> Option<&'static str> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        Some("Password must be at least 8 characters.")
    } else if len > MAX_PASSWORD_LEN {
        Some("Password must be at most 128 characters.")
    } else if !password.chars().any(char::is_alphabetic) {
        Some("Password must contain at least one letter.")
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        Some("Password must contain at least one number.")
    } else {
        None
    }
}

/// Strips spaces from an NHS number. Returns `None` unless exactly ten digits remain.
pub fn normalise_nhs_number(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| *c != ' ').collect();
    (digits.len() == 10 && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

/// Modulus 11: weights 10 down to 2 over the first nine digits; the check digit is
/// `11 - (sum % 11)`, with 11 meaning 0 and 10 meaning the number is invalid.
pub fn is_valid_nhs_number(value: &str) -> bool {
    let Some(digits) = normalise_nhs_number(value) else {
        return false;
    };
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    let sum: u32 = digits[..9]
        .iter()
        .zip((2..=10).rev())
        .map(|(d, w)| d * w)
        .sum();
    let check = match 11 - (sum % 11) {
        11 => 0,
        10 => return false,
        n => n,
    };
    check == digits[9]
}

pub fn is_valid_phone(value: &str) -> bool {
    let value = value.trim();
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '(' | ')' | '-' | ' '));
    let digits = value.chars().filter(char::is_ascii_digit).count();
    allowed && (10..=15).contains(&digits)
}

/// True when the email's domain is one of `domains` or a subdomain of one.
pub fn has_allowed_domain(email: &str, domains: &[String]) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    let domain = domain.to_ascii_lowercase();
    domains
        .iter()
        .any(|allowed| domain == *allowed || domain.ends_with(&format!(".{allowed}")))
}
