// src/users/validators.rs

use super::models::{AddSocialLinkRequest, UserPatch};
use crate::common::{ValidationResult, Validator};

/// Characters a username may never contain
pub const USERNAME_DISALLOWED_CHARS: &str = " !@#№$;%^:&?*()-/\\|,<>`~+=";

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
const DISPLAY_NAME_MAX_LEN: usize = 50;
const BIO_MAX_LEN: usize = 500;
const LINK_MAX_LEN: usize = 2048;

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn has_disallowed_characters(username: &str) -> bool {
    username.chars().any(|c| USERNAME_DISALLOWED_CHARS.contains(c))
}

// ============================================================================
// Profile Validators
// ============================================================================

pub struct ProfileValidator;

impl Validator<UserPatch> for ProfileValidator {
    fn validate(&self, data: &UserPatch) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Some(username) = &data.username {
            result.check_length("username", username.trim(), USERNAME_MIN_LEN, USERNAME_MAX_LEN);
        }

        if let Some(Some(display_name)) = &data.display_name {
            if display_name.chars().count() > DISPLAY_NAME_MAX_LEN {
                result.add_error(
                    "display_name",
                    &format!("must be at most {} characters", DISPLAY_NAME_MAX_LEN),
                );
            }
        }

        if let Some(Some(bio)) = &data.bio {
            if bio.chars().count() > BIO_MAX_LEN {
                result.add_error("bio", &format!("must be at most {} characters", BIO_MAX_LEN));
            }
        }

        result
    }
}

impl Validator<AddSocialLinkRequest> for ProfileValidator {
    fn validate(&self, data: &AddSocialLinkRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.link.trim().is_empty() {
            result.add_error("link", "Link is required");
        } else if data.link.len() > LINK_MAX_LEN {
            result.add_error("link", "Link is too long");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disallowed_characters() {
        for bad in ["bo b", "bob!", "a@b", "x-y", "№1", "a+b", "q=1", "a`b"] {
            assert!(has_disallowed_characters(bad), "{} should be rejected", bad);
        }
        for good in ["bob", "bob_1", "bob.smith", "ёжик"] {
            assert!(!has_disallowed_characters(good), "{} should pass", good);
        }
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  BoB "), "bob");
    }

    #[test]
    fn test_profile_patch_lengths() {
        let patch = UserPatch {
            username: Some("ab".to_string()),
            bio: Some(Some("x".repeat(501))),
            ..Default::default()
        };
        let result = ProfileValidator.validate(&patch);
        assert!(result.has_error("username"));
        assert!(result.has_error("bio"));

        let ok = UserPatch {
            display_name: Some(None),
            ..Default::default()
        };
        assert!(ProfileValidator.validate(&ok).is_valid);
    }

    #[test]
    fn test_social_link_request() {
        let request = AddSocialLinkRequest {
            link: "   ".to_string(),
        };
        assert!(ProfileValidator.validate(&request).has_error("link"));
    }
}
