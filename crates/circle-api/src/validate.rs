//! Boundary checks shared by the handlers.

use crate::error::ApiError;

pub const MAX_AFFIRMATION_LEN: usize = 200;
pub const MAX_THREAD_LEN: usize = 1000;

/// Trim and lowercase an email, rejecting anything that is obviously not one.
pub fn email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::validation("Please provide a valid email"));
    }
    Ok(email)
}

/// Trimmed text whose length in characters lies in `min..=max`.
pub fn text(raw: &str, min: usize, max: usize, field: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(if min <= 1 {
            ApiError::validation(format!("{} is required", field))
        } else {
            ApiError::validation(format!("{} must be at least {} characters", field, min))
        });
    }
    if len > max {
        return Err(ApiError::validation(format!(
            "{} cannot exceed {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

pub fn password(raw: &str) -> Result<(), ApiError> {
    if raw.chars().count() < 6 {
        return Err(ApiError::validation("Password must be at least 6 characters"));
    }
    Ok(())
}

pub fn order(order: i64) -> Result<i64, ApiError> {
    if order < 1 {
        return Err(ApiError::validation("Order must be a positive integer"));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalised() {
        assert_eq!(email("  Ana@Circle.Test ").unwrap(), "ana@circle.test");
        for bad in ["", "ana", "@circle.test", "ana@circle", "ana@@circle.test", "a b@circle.test"] {
            assert!(email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn text_bounds_count_characters_after_trim() {
        assert_eq!(text("  Ana  ", 2, 50, "Name").unwrap(), "Ana");
        assert!(text(" A ", 2, 50, "Name").is_err());
        assert!(text("   ", 1, 50, "Name").is_err());
        assert!(text(&"é".repeat(50), 1, 50, "Name").is_ok());
        assert!(text(&"x".repeat(51), 1, 50, "Name").is_err());
    }

    #[test]
    fn passwords_and_orders() {
        assert!(password("12345").is_err());
        assert!(password("123456").is_ok());
        assert!(order(0).is_err());
        assert_eq!(order(9).unwrap(), 9);
    }
}
