// Request-shape validation shared by the handlers

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.is_valid = false;
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    /// Character-count bounds, inclusive on both ends
    pub fn check_length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min || len > max {
            self.add_error(
                field,
                &format!("must be between {} and {} characters", min, max),
            );
        }
    }

    pub fn check_email(&mut self, field: &str, value: &str) {
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !value.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            self.add_error(field, "must be a valid email address");
        }
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Validator<T> {
    fn validate(&self, data: &T) -> ValidationResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_length_counts_chars() {
        let mut result = ValidationResult::new();
        result.check_length("username", "ab", 3, 20);
        assert!(!result.is_valid);
        assert!(result.has_error("username"));

        let mut result = ValidationResult::new();
        result.check_length("username", "ёжик", 3, 4);
        assert!(result.is_valid);
    }

    #[test]
    fn test_check_email() {
        let mut result = ValidationResult::new();
        result.check_email("email", "a@x.com");
        assert!(result.is_valid);

        for bad in ["", "ax.com", "@x.com", "a@com", "a@x.com.", "a b@x.com"] {
            let mut result = ValidationResult::new();
            result.check_email("email", bad);
            assert!(!result.is_valid, "{} should be rejected", bad);
        }
    }
}
