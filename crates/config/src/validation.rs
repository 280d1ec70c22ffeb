//! Validation system for configuration values
//!
//! Each config section implements the `ConfigSection` trait which includes validation.

pub use crate::error::ValidationError;
use std::path::Path;

/// Trait for configuration sections that can validate themselves
pub trait ConfigSection: Default {
    /// Validates the configuration section
    ///
    /// Returns a list of validation errors. Empty list means valid.
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Merges another config section into this one
    ///
    /// Values from `other` take precedence. This is used for override chains.
    fn merge(&mut self, other: Self);

    /// Returns the section name for error reporting
    fn section_name(&self) -> &'static str;
}

/// Common validators for config values
pub struct Validator;

impl Validator {
    /// Validates that a numeric value is within a range
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a string is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validates that a path is set
    pub fn path_set(path: &Path, field: &str) -> Result<(), ValidationError> {
        if path.as_os_str().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validates that two paths do not point at the same place
    pub fn distinct_paths(
        a: &Path,
        b: &Path,
        field: &str,
        other_field: &str,
    ) -> Result<(), ValidationError> {
        if a == b {
            Err(ValidationError::with_value(
                field,
                format!("must differ from {}", other_field),
                a.display(),
            ))
        } else {
            Ok(())
        }
    }

    /// Collects multiple validation results into a single result
    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
