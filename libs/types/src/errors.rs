//! Error types for the risk register
//!
//! Comprehensive error taxonomy using thiserror. Validation failures are
//! client-correctable and carry field-keyed messages; not-found and
//! authorization failures are reported as distinct variants.

use crate::severity::{Severity, SeverityThreshold};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Mitigation without a linked control
pub const MITIGATE_REQUIRES_CONTROL: &str =
    "Select at least one CSA control when the treatment strategy is Mitigate.";

/// Field-keyed validation messages
///
/// Keys follow the payload field names (`title`, `csa_control_ids`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-message convenience constructor
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages recorded for one field (empty when the field is valid)
    pub fn field(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    /// Check whether any field carries exactly this message
    pub fn contains_message(&self, message: &str) -> bool {
        self.errors
            .values()
            .any(|messages| messages.iter().any(|m| m == message))
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), RiskError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RiskError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Entity kinds that can be referenced by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Risk,
    Threshold,
    Control,
    Component,
    Scope,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Risk => "Risk",
            EntityKind::Threshold => "Threshold",
            EntityKind::Control => "Control",
            EntityKind::Component => "Component",
            EntityKind::Scope => "Scope",
            EntityKind::User => "User",
        };
        f.write_str(name)
    }
}

/// Threshold administration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("Minimum score for {severity} cannot be negative (got {min_score})")]
    NegativeMinimum { severity: Severity, min_score: i64 },

    #[error("Invalid range for {severity}: maximum {max_score} is below minimum {min_score}")]
    InvalidRange {
        severity: Severity,
        min_score: i64,
        max_score: i64,
    },

    #[error("Score {value} for {severity} is out of range")]
    OutOfRange { severity: Severity, value: i64 },

    #[error(
        "Thresholds cannot overlap: {severity} [{min_score}, {max_score}] conflicts with {conflicting}"
    )]
    Overlap {
        severity: Severity,
        min_score: u32,
        max_score: u32,
        conflicting: SeverityThreshold,
    },
}

/// Top-level register error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Threshold error: {0}")]
    Threshold(#[from] ThresholdError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Not authorized to {action}")]
    Unauthorized { action: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RiskError {
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        RiskError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(action: impl Into<String>) -> Self {
        RiskError::Unauthorized {
            action: action.into(),
        }
    }

    /// Validation-class errors are client-correctable
    pub fn is_validation(&self) -> bool {
        matches!(self, RiskError::Validation(_) | RiskError::Threshold(_))
    }
}

impl From<ValidationErrors> for RiskError {
    fn from(errors: ValidationErrors) -> Self {
        RiskError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collect_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "Title is required.");
        errors.add("title", "Title cannot exceed 255 characters.");
        errors.add("impact", "Impact is required.");

        assert_eq!(errors.field("title").len(), 2);
        assert_eq!(errors.field("impact"), ["Impact is required.".to_string()]);
        assert!(errors.field("chance").is_empty());
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["impact", "title"]);
    }

    #[test]
    fn test_empty_validation_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_validation_serializes_as_field_map() {
        let errors = ValidationErrors::single("csa_control_ids", MITIGATE_REQUIRES_CONTROL);
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json["csa_control_ids"][0],
            "Select at least one CSA control when the treatment strategy is Mitigate."
        );
    }

    #[test]
    fn test_overlap_error_names_conflict() {
        let err = ThresholdError::Overlap {
            severity: Severity::Moderate,
            min_score: 5,
            max_score: 10,
            conflicting: SeverityThreshold::new(Severity::Low, 1, 5),
        };
        assert_eq!(
            err.to_string(),
            "Thresholds cannot overlap: Moderate [5, 10] conflicts with Low [1, 5]"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = RiskError::not_found(EntityKind::Control, "abc");
        assert_eq!(err.to_string(), "Control not found: abc");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_risk_error_from_threshold_error() {
        let err: RiskError = ThresholdError::NegativeMinimum {
            severity: Severity::Low,
            min_score: -1,
        }
        .into();
        assert!(matches!(err, RiskError::Threshold(_)));
        assert!(err.is_validation());
    }
}
