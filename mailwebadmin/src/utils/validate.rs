//! Input validation for names, mail addresses and passwords.
//!
//! Domain names and mail addresses end up inside filesystem paths when a
//! mail directory is archived or removed, so every check here also rejects
//! the path-unsafe substrings `..`, `/` and `\`.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const MAX_DOMAIN_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_ADMIN_NAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 30;

/// A user supplied value failed validation. The message is safe to show.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type ValidationResult = std::result::Result<(), ValidationError>;

fn mail_regex() -> &'static Regex {
    static MAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    MAIL_REGEX.get_or_init(|| {
        Regex::new(r"^([a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$)")
            .expect("mail regex is valid")
    })
}

/// Reject strings containing `..`, `/` or `\`.
pub fn contains_invalid_parts(s: &str) -> ValidationResult {
    if s.contains("..") || s.contains('/') || s.contains('\\') {
        return Err(ValidationError::new(
            "string contains one of the following invalid substrings: \"..\", \"/\", \"\\\"",
        ));
    }
    Ok(())
}

/// Passwords must have between 6 and 30 code points.
pub fn password_valid(password: &str) -> ValidationResult {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(format!(
            "Password must be at least of length {}",
            MIN_PASSWORD_LEN
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ValidationError::new(format!(
            "Password length must be at most {}",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Domain names are only checked for length and path-unsafe parts.
pub fn domain_name_valid(name: &str) -> ValidationResult {
    let len = name.chars().count();
    if len == 0 || len > MAX_DOMAIN_LEN {
        return Err(ValidationError::new(format!(
            "Domain length must be not empty and <= {} characters",
            MAX_DOMAIN_LEN
        )));
    }
    if name == "." {
        return Err(ValidationError::new("Domain name must not be \".\""));
    }
    contains_invalid_parts(name)
}

/// Simplified mailbox address check: `local@domain.tld`, at most 100 code points.
pub fn email_valid(mail: &str) -> ValidationResult {
    contains_invalid_parts(mail)?;
    // the local part names the mail directory
    if !mail_regex().is_match(mail) || mail.starts_with(".@") {
        return Err(ValidationError::new(format!(
            "Invalid Email address \"{}\"",
            mail
        )));
    }
    if mail.chars().count() > MAX_EMAIL_LEN {
        return Err(ValidationError::new(format!(
            "Email length must be at most {}",
            MAX_EMAIL_LEN
        )));
    }
    Ok(())
}

pub fn admin_name_valid(user: &str) -> ValidationResult {
    let len = user.chars().count();
    if len == 0 {
        return Err(ValidationError::new("Username must not be empty"));
    }
    if len > MAX_ADMIN_NAME_LEN {
        return Err(ValidationError::new(format!(
            "Username length must be at most {}",
            MAX_ADMIN_NAME_LEN
        )));
    }
    // must stay addressable as /api/admins/<name>
    if user.contains('/') {
        return Err(ValidationError::new("Username must not contain \"/\""));
    }
    Ok(())
}

/// Split an address into local and domain part.
///
/// The local part may be empty (catch-all source like `@example.com`),
/// the domain part may not.
pub fn parse_mail_parts(email: &str) -> std::result::Result<(&str, &str), ValidationError> {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            if domain.is_empty() {
                Err(ValidationError::new(format!(
                    "Invalid Email address \"{}\": Empty domain part",
                    email
                )))
            } else {
                Ok((local, domain))
            }
        }
        _ => Err(ValidationError::new(format!(
            "Invalid Email address \"{}\"",
            email
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parts() {
        assert!(contains_invalid_parts("example.com").is_ok());
        assert!(contains_invalid_parts("a..b").is_err());
        assert!(contains_invalid_parts("a/b").is_err());
        assert!(contains_invalid_parts("a\\b").is_err());
    }

    #[test]
    fn test_password_bounds() {
        assert!(password_valid("12345").is_err());
        assert!(password_valid("123456").is_ok());
        assert!(password_valid(&"x".repeat(30)).is_ok());
        assert!(password_valid(&"x".repeat(31)).is_err());
        // code points, not bytes
        assert!(password_valid("äöüäöü").is_ok());
    }

    #[test]
    fn test_domain_name() {
        assert!(domain_name_valid("example.com").is_ok());
        assert!(domain_name_valid("").is_err());
        assert!(domain_name_valid(&"a".repeat(50)).is_ok());
        assert!(domain_name_valid(&"a".repeat(51)).is_err());
        assert!(domain_name_valid("..").is_err());
        assert!(domain_name_valid(".").is_err());
        assert!(domain_name_valid(".example.com").is_ok());
        assert!(domain_name_valid("foo/bar").is_err());
        assert!(domain_name_valid("foo\\bar").is_err());
    }

    #[test]
    fn test_valid_email() {
        assert!(email_valid("test@example.com").is_ok());
        assert!(email_valid("user.name+tag@example.co.uk").is_ok());
        assert!(email_valid(".@example.com").is_err());
    }

    #[test]
    fn test_invalid_email() {
        assert!(email_valid("").is_err());
        assert!(email_valid("test").is_err());
        assert!(email_valid("test@").is_err());
        assert!(email_valid("@example.com").is_err());
        assert!(email_valid("test@domain").is_err());
        assert!(email_valid("notanemail").is_err());
        assert!(email_valid("a..b@example.com").is_err());
        let long = format!("{}@example.com", "a".repeat(95));
        assert!(email_valid(&long).is_err());
    }

    #[test]
    fn test_admin_name() {
        assert!(admin_name_valid("admin").is_ok());
        assert!(admin_name_valid("").is_err());
        assert!(admin_name_valid(&"a".repeat(150)).is_ok());
        assert!(admin_name_valid(&"a".repeat(151)).is_err());
        assert!(admin_name_valid("a/b").is_err());
    }

    #[test]
    fn test_parse_mail_parts() {
        assert_eq!(
            parse_mail_parts("user@example.com").unwrap(),
            ("user", "example.com")
        );
        assert_eq!(
            parse_mail_parts("@spam.example.com").unwrap(),
            ("", "spam.example.com")
        );
        assert!(parse_mail_parts("user@").is_err());
        assert!(parse_mail_parts("user").is_err());
        assert!(parse_mail_parts("a@b@c").is_err());
    }
}
