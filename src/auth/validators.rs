// src/auth/validators.rs

use super::models::{
    ForgotPasswordRequest, ResetPasswordRequest, SignInRequest, SignUpRequest,
    UpdatePasswordRequest,
};
use crate::common::{ValidationResult, Validator};
use crate::users::validators::{USERNAME_MAX_LEN, USERNAME_MIN_LEN};

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 48;
const EMAIL_MAX_LEN: usize = 254;

pub struct AuthValidator;

impl Validator<SignUpRequest> for AuthValidator {
    fn validate(&self, data: &SignUpRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        let email = data.email.trim();
        result.check_email("email", email);
        if email.len() > EMAIL_MAX_LEN {
            result.add_error("email", "is too long");
        }
        result.check_length("username", data.username.trim(), USERNAME_MIN_LEN, USERNAME_MAX_LEN);
        result.check_length("password", &data.password, PASSWORD_MIN_LEN, PASSWORD_MAX_LEN);

        result
    }
}

impl Validator<SignInRequest> for AuthValidator {
    fn validate(&self, data: &SignInRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.email_or_username.trim().is_empty() {
            result.add_error("email_or_username", "is required");
        }
        if data.password.is_empty() {
            result.add_error("password", "is required");
        }

        result
    }
}

impl Validator<UpdatePasswordRequest> for AuthValidator {
    fn validate(&self, data: &UpdatePasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.old_password.is_empty() {
            result.add_error("old_password", "is required");
        }
        result.check_length(
            "new_password",
            &data.new_password,
            PASSWORD_MIN_LEN,
            PASSWORD_MAX_LEN,
        );

        result
    }
}

impl Validator<ForgotPasswordRequest> for AuthValidator {
    fn validate(&self, data: &ForgotPasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check_email("email", data.email.trim());
        result
    }
}

impl Validator<ResetPasswordRequest> for AuthValidator {
    fn validate(&self, data: &ResetPasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check_length(
            "new_password",
            &data.new_password,
            PASSWORD_MIN_LEN,
            PASSWORD_MAX_LEN,
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_up(email: &str, username: &str, password: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_sign_up_accepts_valid_request() {
        let result = AuthValidator.validate(&sign_up("a@x.com", "bob", "longenough1"));
        assert!(result.is_valid);
    }

    #[test]
    fn test_sign_up_reports_each_bad_field() {
        let result = AuthValidator.validate(&sign_up("nope", "bo", "short"));
        assert!(!result.is_valid);
        assert!(result.has_error("email"));
        assert!(result.has_error("username"));
        assert!(result.has_error("password"));
    }

    #[test]
    fn test_password_upper_bound() {
        let long = "x".repeat(PASSWORD_MAX_LEN + 1);
        let result = AuthValidator.validate(&ResetPasswordRequest {
            code: 1_000_000_000,
            new_password: long,
        });
        assert!(result.has_error("new_password"));
    }

    #[test]
    fn test_sign_in_requires_both_fields() {
        let result = AuthValidator.validate(&SignInRequest {
            email_or_username: "  ".to_string(),
            password: String::new(),
        });
        assert!(result.has_error("email_or_username"));
        assert!(result.has_error("password"));
    }
}
