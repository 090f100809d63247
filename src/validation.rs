//! Form-level validators shared by request models

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use validator::ValidationError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Passwords too common to accept, compared case-insensitively
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "passw0rd", "12345678", "123456789",
    "1234567890", "qwerty123", "qwertyuiop", "iloveyou", "sunshine", "princess",
    "football", "baseball", "welcome1", "letmein1", "abc12345", "admin123",
    "trustno1", "superman", "starwars", "whatever", "dragon123", "monkey123",
    "library1", "library123", "changeme", "11111111", "00000000", "asdfghjk",
];

static ISBN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("valid ISBN regex")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9+() .-]*$").expect("valid phone regex")
});

fn error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// ISBN-10 (digits, optional trailing X) or ISBN-13
pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    if ISBN_RE.is_match(isbn) {
        Ok(())
    } else {
        Err(error("isbn", "Enter a 10 or 13 character ISBN without dashes."))
    }
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(phone) {
        Ok(())
    } else {
        Err(error("phone", "Phone number may only contain digits, spaces and + ( ) . -"))
    }
}

/// Password strength rules: minimum length, not entirely numeric, not common
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(error(
            "password_too_short",
            format!("This password is too short. It must contain at least {} characters.", MIN_PASSWORD_LENGTH),
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(error("password_entirely_numeric", "This password is entirely numeric."));
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        return Err(error("password_too_common", "This password is too common."));
    }
    Ok(())
}

/// Reject passwords that contain a user attribute (email local part, names)
pub fn validate_password_similarity(password: &str, attributes: &[&str]) -> Result<(), ValidationError> {
    let lowered = password.to_lowercase();
    for attribute in attributes {
        let attribute = attribute.trim().to_lowercase();
        if attribute.chars().count() < 3 {
            continue;
        }
        if lowered.contains(&attribute) || attribute.contains(&lowered) {
            return Err(error(
                "password_too_similar",
                "The password is too similar to your personal information.",
            ));
        }
    }
    Ok(())
}

/// Normalize an email address: NFKC, trimmed, domain part lowercased
pub fn normalize_email(email: &str) -> String {
    let email: String = email.trim().nfkc().collect();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email,
    }
}

/// URL slug from a display name: lowercase ASCII alphanumerics joined by dashes
pub fn slugify(name: &str) -> String {
    let ascii: String = name.nfkd().filter(|c| c.is_ascii()).collect();
    let mut slug = String::with_capacity(ascii.len());
    let mut dash = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !slug.is_empty() && !dash {
            slug.push('-');
            dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isbn_accepts_10_and_13() {
        assert!(validate_isbn("9780306406157").is_ok());
        assert!(validate_isbn("030640615X").is_ok());
        assert!(validate_isbn("978-0306406157").is_err());
        assert!(validate_isbn("12345").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("1234567890123").is_err());
        assert!(validate_password_strength("Password123").is_err());
        assert!(validate_password_strength("tidal-Lantern-42").is_ok());
    }

    #[test]
    fn password_similarity_checks_attributes() {
        assert!(validate_password_similarity("alice.smith99", &["alice.smith", "Alice", "Smith"]).is_err());
        assert!(validate_password_similarity("tidal-Lantern-42", &["alice.smith", "Al", "Smith"]).is_ok());
        // Short attributes are ignored
        assert!(validate_password_similarity("xyabz-123-long", &["ab"]).is_ok());
    }

    #[test]
    fn email_domain_is_lowercased() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "Alice@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Science Fiction"), "science-fiction");
        assert_eq!(slugify("  Café & Crème "), "cafe-creme");
        assert_eq!(slugify("C++ / Rust!"), "c-rust");
    }

    #[test]
    fn phone_characters() {
        assert!(validate_phone("+60 (3) 555-0101").is_ok());
        assert!(validate_phone("call me").is_err());
    }
}
