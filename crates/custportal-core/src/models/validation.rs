//! Client-side form validation.
//!
//! These rules only decide whether a form can be submitted. The server
//! validates everything again.

use std::fmt;

use super::customer::{CustomerRegistrationRequest, CustomerUpdateRequest, UsernamePassword};

/// Maximum length of a customer name
pub const MAX_NAME_LENGTH: usize = 15;

/// Maximum length of a sign-in password
pub const MAX_SIGN_IN_PASSWORD_LENGTH: usize = 20;

/// Allowed password length at registration
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const MAX_PASSWORD_LENGTH: usize = 15;

/// Allowed customer age range
pub const MIN_AGE: u32 = 16;
pub const MAX_AGE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub trait Validate {
    /// All rule violations, empty when the form may be submitted
    fn validate(&self) -> Vec<FieldError>;

    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Loose shape check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn check_email(errors: &mut Vec<FieldError>, field: &'static str, email: &str) {
    if email.is_empty() {
        errors.push(FieldError::new(field, "Required"));
    } else if !is_valid_email(email) {
        errors.push(FieldError::new(field, "Invalid email address"));
    }
}

fn check_name(errors: &mut Vec<FieldError>, name: &str) {
    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "Required"));
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.push(FieldError::new(
            "name",
            format!("Must be {} characters or less", MAX_NAME_LENGTH),
        ));
    }
}

fn check_age(errors: &mut Vec<FieldError>, age: u32) {
    if age < MIN_AGE {
        errors.push(FieldError::new(
            "age",
            format!("Must be at least {} years of age", MIN_AGE),
        ));
    } else if age > MAX_AGE {
        errors.push(FieldError::new(
            "age",
            format!("Must be less than {} years of age", MAX_AGE),
        ));
    }
}

impl Validate for UsernamePassword {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_email(&mut errors, "username", &self.username);
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Required"));
        } else if self.password.chars().count() > MAX_SIGN_IN_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("Must be {} characters or less", MAX_SIGN_IN_PASSWORD_LENGTH),
            ));
        }
        errors
    }
}

impl Validate for CustomerRegistrationRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_name(&mut errors, &self.name);
        check_email(&mut errors, "email", &self.email);
        check_age(&mut errors, self.age);

        let len = self.password.chars().count();
        if len == 0 {
            errors.push(FieldError::new("password", "Required"));
        } else if len < MIN_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("Must be at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        } else if len > MAX_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("Must be {} characters or less", MAX_PASSWORD_LENGTH),
            ));
        }
        errors
    }
}

impl Validate for CustomerUpdateRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if let Some(ref name) = self.name {
            check_name(&mut errors, name);
        }
        if let Some(ref email) = self.email {
            check_email(&mut errors, "email", email);
        }
        if let Some(age) = self.age {
            check_age(&mut errors, age);
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    fn registration() -> CustomerRegistrationRequest {
        CustomerRegistrationRequest {
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            password: "secret1".to_string(),
            age: 24,
            gender: Gender::Female,
        }
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("jane@x.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("jane@x"));
        assert!(!is_valid_email("jane@.com"));
        assert!(!is_valid_email("jane@x.com "));
        assert!(!is_valid_email("jane@@x.com"));
    }

    #[test]
    fn test_sign_in_rules() {
        assert!(UsernamePassword::new("jane@x.com", "secret1").is_valid());

        let errors = UsernamePassword::new("", "").validate();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message == "Required"));

        let errors = UsernamePassword::new("jane", &"x".repeat(21)).validate();
        assert_eq!(errors[0].field, "username");
        assert_eq!(errors[1].message, "Must be 20 characters or less");
    }

    #[test]
    fn test_registration_rules() {
        assert!(registration().is_valid());

        let mut req = registration();
        req.name = "A very long customer name".to_string();
        req.age = 15;
        req.password = "abc".to_string();
        let fields: Vec<_> = req.validate().iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "age", "password"]);

        let mut req = registration();
        req.age = 101;
        assert_eq!(
            req.validate()[0].to_string(),
            "age: Must be less than 100 years of age"
        );
    }

    #[test]
    fn test_update_rules_only_check_present_fields() {
        assert!(CustomerUpdateRequest::default().is_valid());

        let req = CustomerUpdateRequest {
            email: Some("nope".to_string()),
            age: Some(100),
            ..Default::default()
        };
        let errors = req.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "email");
    }
}
