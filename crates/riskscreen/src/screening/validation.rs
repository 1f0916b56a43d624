//! Pre-network validation of a screening record.
//!
//! Every issue is collected before the save aborts, so the operator sees the
//! complete list rather than the first failure.

use chrono::NaiveDate;

use super::domain::{FieldKey, ScreeningRecord, Sex};
use super::sync::normalize::{is_affirmative, is_negative};

const MIN_AGE_YEARS: i32 = 10;
const MAX_AGE_YEARS: i32 = 99;

const REQUIRED_FIELDS: &[FieldKey] = &[
    FieldKey::FamilyName,
    FieldKey::LastName,
    FieldKey::Sex,
    FieldKey::DateOfBirth,
    FieldKey::Province,
    FieldKey::District,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("required field '{0}' is missing")]
    MissingField(FieldKey),
    #[error("date of birth is in the future")]
    FutureBirthDate,
    #[error("age {0} is outside the accepted range")]
    AgeOutOfRange(i32),
    #[error("'{value}' is not a valid answer for '{key}'")]
    InvalidAnswer { key: FieldKey, value: String },
    #[error("record has no event reference to update")]
    MissingEventReference,
}

/// Checks required identity/location fields, the birth date, and the
/// enumerated answers. Runs entirely offline.
pub fn validate(record: &ScreeningRecord, today: NaiveDate) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    for key in REQUIRED_FIELDS {
        if record.value_of(*key).is_none() {
            issues.push(ValidationIssue::MissingField(*key));
        }
    }

    if let Some(sex) = record.value_of(FieldKey::Sex) {
        if Sex::parse(&sex).is_none() {
            issues.push(ValidationIssue::InvalidAnswer {
                key: FieldKey::Sex,
                value: sex,
            });
        }
    }

    if let Some(birth_date) = record.identity.date_of_birth {
        if birth_date > today {
            issues.push(ValidationIssue::FutureBirthDate);
        } else {
            let age = age_in_years(birth_date, today);
            if !(MIN_AGE_YEARS..=MAX_AGE_YEARS).contains(&age) {
                issues.push(ValidationIssue::AgeOutOfRange(age));
            }
        }
    }

    for key in FieldKey::YES_NO_KEYS {
        if let Some(answer) = record.answer(*key) {
            if !answer.trim().is_empty() && !is_affirmative(answer) && !is_negative(answer) {
                issues.push(ValidationIssue::InvalidAnswer {
                    key: *key,
                    value: answer.to_string(),
                });
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn age_in_years(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    today.years_since(birth_date).map_or(0, |years| years as i32)
}
