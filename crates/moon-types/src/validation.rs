use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: String,
        max: String,
        value: String,
    },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{0} is empty")]
    Empty(&'static str),
}

/// Inclusive numeric bounds for a form field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeLimit<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Display + Copy> RangeLimit<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn check(&self, field: &'static str, value: T) -> Result<(), ValidationError> {
        if value < self.min || value > self.max {
            return Err(ValidationError::OutOfRange {
                field,
                min: self.min.to_string(),
                max: self.max.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive() {
        let limit = RangeLimit::new(0usize, 3);
        assert!(limit.check("attachments", 0).is_ok());
        assert!(limit.check("attachments", 3).is_ok());
        let err = limit.check("attachments", 4).unwrap_err();
        assert_eq!(err.to_string(), "attachments must be between 0 and 3, got 4");
    }

    #[test]
    fn float_ranges_reject_negative_values() {
        let limit = RangeLimit::new(0.0, 120.0);
        assert!(limit.check("timestamp", -1.0).is_err());
    }
}
