use regex::Regex;
use std::sync::LazyLock;

use crate::error::FieldError;

static RE_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^09[0-9]{9}$").expect("valid mobile regex"));

static RE_NATIONAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8,10}$").expect("valid national id regex"));

/// Iranian mobile numbers in national format, e.g. `09123456789`.
#[must_use]
pub fn valid_mobile(mobile: &str) -> bool {
    RE_MOBILE.is_match(mobile)
}

/// Left-pad an 8 or 9 digit national id to its canonical 10 digits.
#[must_use]
pub fn normalize_national_id(value: &str) -> String {
    format!("{:0>10}", value.trim())
}

/// Iranian national identity code: 8 to 10 digits, not a single repeated
/// digit, and a valid mod-11 check digit once padded to 10 digits.
#[must_use]
pub fn valid_national_id(value: &str) -> bool {
    let value = value.trim();
    if !RE_NATIONAL_ID.is_match(value) {
        return false;
    }

    let padded = normalize_national_id(value);
    let digits: Vec<u32> = padded.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 10 || digits.iter().all(|digit| *digit == digits[0]) {
        return false;
    }

    let sum: u32 = digits[..9]
        .iter()
        .zip((2..=10).rev())
        .map(|(digit, weight)| digit * weight)
        .sum();
    let remainder = sum % 11;
    let control = if remainder < 2 {
        remainder
    } else {
        11 - remainder
    };
    digits[9] == control
}

/// Collect every field error of a registration request.
pub(super) fn validate(mobile: &str, national_id: Option<&str>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if mobile.trim().is_empty() {
        errors.push(FieldError::new("mobile", "required"));
    } else if !valid_mobile(mobile.trim()) {
        errors.push(FieldError::new("mobile", "invalid mobile number"));
    }
    if let Some(national_id) = national_id {
        if !valid_national_id(national_id) {
            errors.push(FieldError::new(
                "national_id",
                "invalid national identity code",
            ));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_format() {
        assert!(valid_mobile("09123456789"));
        assert!(!valid_mobile("9123456789"));
        assert!(!valid_mobile("0912345678"));
        assert!(!valid_mobile("091234567890"));
        assert!(!valid_mobile("+989123456789"));
        assert!(!valid_mobile("0912345678a"));
    }

    #[test]
    fn national_id_checksum() {
        assert!(valid_national_id("0499370899"));
        assert!(valid_national_id("0790419904"));
        assert!(!valid_national_id("0499370898"));
        assert!(!valid_national_id("1111111111"));
        assert!(!valid_national_id("0000000000"));
        assert!(!valid_national_id("1234567"));
        assert!(!valid_national_id("12345678901"));
        assert!(!valid_national_id("04993708a9"));
        // arabic-indic digits are not accepted
        assert!(!valid_national_id("٠٤٩٩٣٧٠٨٩٩"));
    }

    #[test]
    fn short_national_ids_are_padded() {
        assert_eq!(normalize_national_id("99370899"), "0099370899");
        // 0099370899 => sum 0+0+72+63+18+35+0+24+18 = 230, 230 % 11 = 10, control 1
        assert!(!valid_national_id("99370899"));
        assert!(valid_national_id("99370891"));
    }

    #[test]
    fn validate_collects_all_errors() {
        let errors = validate("123", Some("1111111111"));
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["mobile", "national_id"]);

        let errors = validate("", None);
        assert_eq!(errors, vec![FieldError::new("mobile", "required")]);

        assert!(validate("09123456789", Some("0499370899")).is_empty());
        assert!(validate("09123456789", None).is_empty());
    }
}
