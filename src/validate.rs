//! Field-level validation applied before any record write.
//!
//! Messages match the wording the admin forms already show users, so callers
//! can surface `ValidationError::to_string()` unchanged.

use chrono::NaiveDate;
use thiserror::Error;

use crate::model::Semester;

pub const ADMISSION_MIN: i64 = 1;
pub const ADMISSION_MAX: i64 = 1000;
pub const SUB_SCORE_MIN: i64 = 0;
pub const SUB_SCORE_MAX: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Mobile number must be 10 digit number")]
    Phone { field: &'static str },

    #[error("Ensure this value is greater than or equal to {min}.")]
    BelowMin { field: &'static str, min: i64 },

    #[error("Ensure this value is less than or equal to {max}.")]
    AboveMax { field: &'static str, max: i64 },

    #[error("Ensure this value has at most {max} characters (it has {actual}).")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("This field cannot be blank.")]
    Blank { field: &'static str },

    #[error("Select a valid choice. {value} is not one of the available choices.")]
    Choice { field: &'static str, value: i64 },

    #[error("'{value}' value has an invalid date format. It must be in YYYY-MM-DD format.")]
    Date { field: &'static str, value: String },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Phone { field }
            | Self::BelowMin { field, .. }
            | Self::AboveMax { field, .. }
            | Self::TooLong { field, .. }
            | Self::Blank { field }
            | Self::Choice { field, .. }
            | Self::Date { field, .. } => *field,
        }
    }
}

/// Phone numbers are checked by the length of their decimal text, not by
/// numeric range. A leading minus sign counts toward the ten characters.
pub fn phone(field: &'static str, value: i64) -> Result<i64, ValidationError> {
    if value.to_string().len() != 10 {
        return Err(ValidationError::Phone { field });
    }
    Ok(value)
}

pub fn int_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<i64, ValidationError> {
    if value < min {
        return Err(ValidationError::BelowMin { field, min });
    }
    if value > max {
        return Err(ValidationError::AboveMax { field, max });
    }
    Ok(value)
}

pub fn admission_no(value: i64) -> Result<i64, ValidationError> {
    int_range("admissionNo", value, ADMISSION_MIN, ADMISSION_MAX)
}

pub fn sub_score(field: &'static str, value: i64) -> Result<i64, ValidationError> {
    int_range(field, value, SUB_SCORE_MIN, SUB_SCORE_MAX)
}

/// Trims, rejects empty text, and caps length in characters.
pub fn text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Blank { field });
    }
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(value.to_string())
}

pub fn semester(field: &'static str, code: i64) -> Result<Semester, ValidationError> {
    match Semester::from_code(code) {
        Some(s) if s != Semester::Unset => Ok(s),
        _ => Err(ValidationError::Choice { field, value: code }),
    }
}

pub fn date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::Date {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_accepts_exactly_ten_characters() {
        assert_eq!(phone("phone", 9876543210), Ok(9876543210));
        assert_eq!(phone("phone", 1000000000), Ok(1000000000));
        // The minus sign is a character like any other.
        assert_eq!(phone("phone", -123456789), Ok(-123456789));
    }

    #[test]
    fn phone_rejects_other_lengths() {
        for v in [0, 123456789, 12345678901, -1234567890, i64::MAX] {
            let e = phone("phone", v).expect_err("should reject");
            assert_eq!(e.to_string(), "Mobile number must be 10 digit number");
            assert_eq!(e.field(), "phone");
        }
    }

    #[test]
    fn admission_bounds_are_inclusive() {
        assert!(admission_no(1).is_ok());
        assert!(admission_no(1000).is_ok());
        assert_eq!(
            admission_no(0).unwrap_err().to_string(),
            "Ensure this value is greater than or equal to 1."
        );
        assert_eq!(
            admission_no(1001).unwrap_err().to_string(),
            "Ensure this value is less than or equal to 1000."
        );
    }

    #[test]
    fn sub_score_bounds_are_inclusive() {
        for v in 0..=50 {
            assert_eq!(sub_score("attendance", v), Ok(v));
        }
        assert!(sub_score("attendance", -1).is_err());
        assert!(sub_score("attendance", 51).is_err());
    }

    #[test]
    fn text_counts_characters_not_bytes() {
        assert_eq!(text("name", "  BSc CS  ", 10), Ok("BSc CS".to_string()));
        // 10 two-byte characters still fit in a 10 character field.
        assert!(text("name", "éééééééééé", 10).is_ok());
        assert_eq!(
            text("name", "Computer Sc", 10).unwrap_err(),
            ValidationError::TooLong {
                field: "name",
                max: 10,
                actual: 11
            }
        );
        assert_eq!(
            text("name", "   ", 10).unwrap_err(),
            ValidationError::Blank { field: "name" }
        );
    }

    #[test]
    fn semester_accepts_only_enumerated_codes() {
        assert_eq!(semester("semester", 1), Ok(Semester::Semester1));
        assert_eq!(semester("semester", 6), Ok(Semester::Semester6));
        assert_eq!(
            semester("semester", 7).unwrap_err().to_string(),
            "Select a valid choice. 7 is not one of the available choices."
        );
        assert!(semester("semester", 0).is_err());
    }

    #[test]
    fn date_requires_iso_format() {
        assert_eq!(
            date("dueDate", "2024-03-01"),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"))
        );
        assert!(date("dueDate", "01/03/2024").is_err());
        assert!(date("dueDate", "2024-02-30").is_err());
    }
}
