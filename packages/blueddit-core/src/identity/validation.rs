//! Shape validation for account input.
//!
//! Every check runs, so the caller gets the complete list of reasons rather
//! than only the first one.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{RegisterData, UpdateProfileData};
use crate::error::ValidationErrors;

/// Username length bounds, in characters
pub const USERNAME_MIN: usize = 3;
/// Username length bounds, in characters
pub const USERNAME_MAX: usize = 20;
/// Minimum password length, in characters
pub const PASSWORD_MIN: usize = 6;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("valid email regex")
});

/// Registration input that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ValidRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Profile update input that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ValidProfileUpdate {
    pub current_username: String,
    pub username: String,
    pub email: String,
    pub current_password: String,
    /// `None` keeps the existing password
    pub new_password: Option<String>,
}

impl ValidProfileUpdate {
    /// Whether the update changes the primary key
    pub fn is_rename(&self) -> bool {
        self.username != self.current_username
    }
}

fn check_username(errors: &mut ValidationErrors, field: &'static str, username: &str) {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        errors.push(
            field,
            format!(
                "Username must be between {} and {} characters",
                USERNAME_MIN, USERNAME_MAX
            ),
        );
    }
}

fn check_password(errors: &mut ValidationErrors, field: &'static str, password: &str) {
    if password.chars().count() < PASSWORD_MIN {
        errors.push(
            field,
            format!("Password must be at least {} characters", PASSWORD_MIN),
        );
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !is_valid_email(email) {
        errors.push("email", "Invalid email address");
    }
}

/// Loose well-formedness check: `local@domain.tld`, no whitespace
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Validate registration input
pub fn validate_registration(data: &RegisterData) -> Result<ValidRegistration, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_username(&mut errors, "username", &data.username);
    check_email(&mut errors, &data.email);
    check_password(&mut errors, "password", &data.password);

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidRegistration {
        username: data.username.clone(),
        email: data.email.clone(),
        password: data.password.clone(),
    })
}

/// Validate a profile update
///
/// An empty `new_password` is treated as absent.
pub fn validate_profile_update(
    data: &UpdateProfileData,
) -> Result<ValidProfileUpdate, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_username(&mut errors, "username", &data.username);
    check_email(&mut errors, &data.email);
    if data.current_password.is_empty() {
        errors.push("currentPassword", "Current password is required");
    }

    let new_password = data
        .new_password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    if let Some(p) = &new_password {
        check_password(&mut errors, "newPassword", p);
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidProfileUpdate {
        current_username: data.current_username.clone(),
        username: data.username.clone(),
        email: data.email.clone(),
        current_password: data.current_password.clone(),
        new_password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str) -> RegisterData {
        RegisterData {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_valid_registration() {
        let valid = validate_registration(&registration("alice", "alice@x.com", "secret1")).unwrap();
        assert_eq!(valid.username, "alice");
    }

    #[test]
    fn test_username_bounds() {
        assert!(validate_registration(&registration("ab", "a@x.com", "secret1")).is_err());
        assert!(validate_registration(&registration("abc", "a@x.com", "secret1")).is_ok());
        assert!(validate_registration(&registration(&"a".repeat(20), "a@x.com", "secret1")).is_ok());
        assert!(validate_registration(&registration(&"a".repeat(21), "a@x.com", "secret1")).is_err());
        // Counted in characters, not bytes
        assert!(validate_registration(&registration("ééé", "a@x.com", "secret1")).is_ok());
    }

    #[test]
    fn test_all_reasons_reported() {
        let errors = validate_registration(&registration("a", "nope", "123")).unwrap_err();
        assert_eq!(errors.iter().count(), 3);
        assert!(errors.has_field("username"));
        assert!(errors.has_field("email"));
        assert!(errors.has_field("password"));
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@c.com"));
        assert!(!is_valid_email("a@.com"));
    }

    #[test]
    fn test_profile_update_optional_password() {
        let mut data = UpdateProfileData {
            current_username: "alice".into(),
            username: "alice2".into(),
            email: "alice@x.com".into(),
            current_password: "secret1".into(),
            new_password: Some(String::new()),
        };
        let valid = validate_profile_update(&data).unwrap();
        assert!(valid.new_password.is_none());
        assert!(valid.is_rename());

        data.new_password = Some("123".into());
        let errors = validate_profile_update(&data).unwrap_err();
        assert!(errors.has_field("newPassword"));

        data.new_password = Some("longer1".into());
        assert_eq!(
            validate_profile_update(&data).unwrap().new_password.as_deref(),
            Some("longer1")
        );
    }
}
